//! Component declarations → compiled component.
//!
//! A `ComponentSpec` collects field and derived-node declarations; `build`
//! compiles every expression once, extracts dependencies, builds the
//! dependency graph and collects transpilation diagnostics. The result is
//! immutable per component type and shared by every per-connection
//! session created from it.

use crate::error::{BuildError, Untranspilable};
use crate::expr::{CompiledExpr, compile};
use crate::field::FieldDef;
use crate::graph::DependencyGraph;
use crate::store::Snapshot;
use crate::value::Value;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::sync::Arc;

/// How a derived node computes its value.
#[derive(Clone)]
pub enum Compute {
    Sync(Arc<dyn Fn(&Snapshot) -> Result<Value, String> + Send + Sync>),
    Async(Arc<dyn Fn(&Snapshot) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>),
}

impl Compute {
    pub fn is_async(&self) -> bool {
        matches!(self, Compute::Async(_))
    }
}

/// A derived-node declaration.
pub struct DerivedDef {
    pub name: Arc<str>,
    pub kind: DerivedKind,
    /// Requested for client mirroring; forced off at build when the node
    /// has no client source.
    pub optimistic: bool,
}

pub enum DerivedKind {
    /// Dependency set extracted statically from the expression.
    Expression { source: Arc<str> },
    /// Explicit dependencies and an opaque compute closure. Closures are
    /// never scanned for dependencies; the declaration is authoritative.
    Computed {
        dependencies: Vec<Arc<str>>,
        compute: Compute,
    },
}

/// A built derived node.
#[derive(Clone)]
pub struct DerivedNode {
    pub name: Arc<str>,
    pub dependencies: Vec<Arc<str>>,
    pub compute: Compute,
    pub optimistic: bool,
    /// Present only for expression-backed nodes.
    pub expression: Option<CompiledExpr>,
}

impl DerivedNode {
    pub fn is_async(&self) -> bool {
        self.compute.is_async()
    }
}

/// `Untranspilable` markers collected during build, keyed by node name.
/// Consumed by build tooling via [`Component::diagnostics`].
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub server_only: Vec<(Arc<str>, Untranspilable)>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.server_only.is_empty()
    }
}

#[derive(Default)]
pub struct ComponentSpec {
    name: Arc<str>,
    fields: Vec<FieldDef>,
    derived: Vec<DerivedDef>,
}

impl ComponentSpec {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            derived: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Expression-backed derived node.
    pub fn derive(mut self, name: impl Into<Arc<str>>, source: impl Into<Arc<str>>) -> Self {
        self.derived.push(DerivedDef {
            name: name.into(),
            kind: DerivedKind::Expression {
                source: source.into(),
            },
            optimistic: false,
        });
        self
    }

    /// Expression-backed derived node requested for client mirroring.
    pub fn derive_optimistic(
        mut self,
        name: impl Into<Arc<str>>,
        source: impl Into<Arc<str>>,
    ) -> Self {
        self.derived.push(DerivedDef {
            name: name.into(),
            kind: DerivedKind::Expression {
                source: source.into(),
            },
            optimistic: true,
        });
        self
    }

    /// Closure-backed synchronous node with explicit dependencies.
    pub fn derive_computed(
        mut self,
        name: impl Into<Arc<str>>,
        dependencies: impl IntoIterator<Item = impl Into<Arc<str>>>,
        compute: impl Fn(&Snapshot) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.derived.push(DerivedDef {
            name: name.into(),
            kind: DerivedKind::Computed {
                dependencies: dependencies.into_iter().map(Into::into).collect(),
                compute: Compute::Sync(Arc::new(compute)),
            },
            optimistic: false,
        });
        self
    }

    /// Closure-backed asynchronous node with explicit dependencies.
    pub fn derive_async(
        mut self,
        name: impl Into<Arc<str>>,
        dependencies: impl IntoIterator<Item = impl Into<Arc<str>>>,
        compute: impl Fn(&Snapshot) -> BoxFuture<'static, Result<Value, String>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.derived.push(DerivedDef {
            name: name.into(),
            kind: DerivedKind::Computed {
                dependencies: dependencies.into_iter().map(Into::into).collect(),
                compute: Compute::Async(Arc::new(compute)),
            },
            optimistic: false,
        });
        self
    }

    pub fn build(self) -> Result<Component, BuildError> {
        let mut diagnostics = Diagnostics::default();
        let mut nodes: IndexMap<Arc<str>, DerivedNode> = IndexMap::new();

        for definition in self.derived {
            let name = definition.name;
            let (dependencies, compute, expression, mut optimistic) = match definition.kind {
                DerivedKind::Expression { source } => {
                    let compiled = compile(&source).map_err(|errors| BuildError::Parse {
                        node: name.clone(),
                        message: errors
                            .iter()
                            .map(|error| error.message.clone())
                            .collect::<Vec<_>>()
                            .join("; "),
                    })?;
                    let dependencies = compiled.dependencies().to_vec();
                    let closure = compiled.server_eval();
                    (
                        dependencies,
                        Compute::Sync(closure),
                        Some(compiled),
                        definition.optimistic,
                    )
                }
                DerivedKind::Computed {
                    dependencies,
                    compute,
                } => (dependencies, compute, None, definition.optimistic),
            };

            // Client mirroring requires equivalent client source; anything
            // without it is demoted to server-only.
            if optimistic {
                match expression.as_ref().map(|compiled| compiled.client_source()) {
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        diagnostics.server_only.push((name.clone(), error.clone()));
                        optimistic = false;
                    }
                    None => {
                        diagnostics.server_only.push((
                            name.clone(),
                            Untranspilable {
                                construct: name.clone(),
                                reason: "closure-backed node has no expression to mirror".into(),
                            },
                        ));
                        optimistic = false;
                    }
                }
            }

            let node = DerivedNode {
                name: name.clone(),
                dependencies,
                compute,
                optimistic,
                expression,
            };
            if nodes.insert(name.clone(), node).is_some() {
                return Err(BuildError::DuplicateName { name });
            }
        }

        let graph = DependencyGraph::build(
            self.fields.iter().map(|field| field.name.clone()),
            nodes
                .iter()
                .map(|(name, node)| (name.clone(), node.dependencies.clone())),
        )?;

        Ok(Component {
            name: self.name,
            fields: self.fields,
            nodes,
            graph,
            diagnostics,
        })
    }
}

/// A built component type: immutable topology, compiled expressions,
/// transpilation diagnostics.
pub struct Component {
    name: Arc<str>,
    fields: Vec<FieldDef>,
    nodes: IndexMap<Arc<str>, DerivedNode>,
    graph: DependencyGraph,
    diagnostics: Diagnostics,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name.as_ref() == name)
    }

    pub fn node(&self, name: &str) -> Option<&DerivedNode> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DerivedNode> {
        self.nodes.values()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Direct dependents of a field or derived node.
    pub fn list_dependents(&self, name: &str) -> &[Arc<str>] {
        self.graph.dependents_of(name)
    }

    /// `Untranspilable` markers collected during compilation.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Fields and nodes eligible for client mirroring: optimistic fields,
    /// plus optimistic derived nodes that survived transpilation.
    pub fn mirrored_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|field| field.optimistic)
    }

    pub fn mirrored_nodes(&self) -> impl Iterator<Item = &DerivedNode> {
        self.nodes.values().filter(|node| node.optimistic)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}
