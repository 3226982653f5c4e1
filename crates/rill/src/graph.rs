//! Dependency graph over fields and derived nodes.
//!
//! Built once per component type and immutable after build: declarations
//! are closed, the topological order is computed once and cached. Build
//! fails with `CyclicDependency` naming the cycle when the declarations do
//! not form a DAG.

use crate::error::BuildError;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Default)]
struct NodeInfo {
    /// Direct dependents, in their declaration order.
    dependents: SmallVec<[Arc<str>; 4]>,
    /// Direct dependencies (derived nodes only; fields depend on nothing).
    dependencies: SmallVec<[Arc<str>; 4]>,
    is_derived: bool,
}

#[derive(Debug)]
pub struct DependencyGraph {
    nodes: IndexMap<Arc<str>, NodeInfo>,
    /// Derived node names in dependency order, ties broken by declaration
    /// order. Cached at build.
    topological: Vec<Arc<str>>,
}

impl DependencyGraph {
    /// Build from field names plus (derived name, dependency set) pairs,
    /// both in declaration order.
    pub fn build(
        fields: impl IntoIterator<Item = Arc<str>>,
        derived: impl IntoIterator<Item = (Arc<str>, Vec<Arc<str>>)>,
    ) -> Result<Self, BuildError> {
        let mut nodes: IndexMap<Arc<str>, NodeInfo> = IndexMap::new();
        for name in fields {
            if nodes.insert(name.clone(), NodeInfo::default()).is_some() {
                return Err(BuildError::DuplicateName { name });
            }
        }
        let mut derived_order = Vec::new();
        for (name, dependencies) in derived {
            // Dedupe, preserving order, so edge counts stay consistent.
            let mut unique: SmallVec<[Arc<str>; 4]> = SmallVec::new();
            for dependency in dependencies {
                if !unique.contains(&dependency) {
                    unique.push(dependency);
                }
            }
            let info = NodeInfo {
                dependents: SmallVec::new(),
                dependencies: unique,
                is_derived: true,
            };
            if nodes.insert(name.clone(), info).is_some() {
                return Err(BuildError::DuplicateName { name });
            }
            derived_order.push(name);
        }

        // Union the dependency sets into dependent edges, validating that
        // every dependency names a declared field or derived node.
        for node_name in derived_order.iter() {
            let dependencies = nodes[node_name.as_ref()].dependencies.clone();
            for dependency in dependencies {
                let Some(info) = nodes.get_mut(dependency.as_ref()) else {
                    return Err(BuildError::UnknownDependency {
                        node: node_name.clone(),
                        dependency,
                    });
                };
                if !info.dependents.contains(node_name) {
                    info.dependents.push(node_name.clone());
                }
            }
        }

        let topological = topological_order(&nodes, &derived_order)?;
        Ok(Self { nodes, topological })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn is_derived(&self, name: &str) -> bool {
        self.nodes
            .get(name)
            .is_some_and(|info| info.is_derived)
    }

    /// Derived node names such that every node comes after all of its
    /// dependencies. Deterministic across builds.
    pub fn topological_order(&self) -> &[Arc<str>] {
        &self.topological
    }

    /// Direct dependents of a field or derived node.
    pub fn dependents_of(&self, name: &str) -> &[Arc<str>] {
        self.nodes
            .get(name)
            .map(|info| info.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependencies_of(&self, name: &str) -> &[Arc<str>] {
        self.nodes
            .get(name)
            .map(|info| info.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// All transitive dependents of the seed names: the derived nodes that
    /// are stale when the seeds change. The seeds themselves are not
    /// included unless some seed depends on another.
    pub fn transitive_dependents(
        &self,
        seeds: impl IntoIterator<Item = Arc<str>>,
    ) -> BTreeSet<Arc<str>> {
        let mut stale = BTreeSet::new();
        let mut queue: Vec<Arc<str>> = seeds.into_iter().collect();
        while let Some(name) = queue.pop() {
            for dependent in self.dependents_of(&name) {
                if stale.insert(dependent.clone()) {
                    queue.push(dependent.clone());
                }
            }
        }
        stale
    }
}

/// Kahn's algorithm restricted to derived nodes, scanning in declaration
/// order so ties are broken deterministically. If no progress is possible
/// the remaining nodes contain a cycle, which a DFS then names.
fn topological_order(
    nodes: &IndexMap<Arc<str>, NodeInfo>,
    derived_order: &[Arc<str>],
) -> Result<Vec<Arc<str>>, BuildError> {
    let mut indegree: IndexMap<&str, usize> = derived_order
        .iter()
        .map(|name| {
            let derived_dependency_count = nodes[name.as_ref()]
                .dependencies
                .iter()
                .filter(|dependency| {
                    nodes
                        .get(dependency.as_ref())
                        .is_some_and(|info| info.is_derived)
                })
                .count();
            (name.as_ref(), derived_dependency_count)
        })
        .collect();

    let mut order = Vec::with_capacity(derived_order.len());
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    while order.len() < derived_order.len() {
        let next = derived_order.iter().find(|name| {
            !emitted.contains(name.as_ref()) && indegree[name.as_ref()] == 0
        });
        let Some(next) = next else {
            return Err(find_cycle(nodes, derived_order, &emitted));
        };
        emitted.insert(next.as_ref());
        order.push(next.clone());
        for dependent in &nodes[next.as_ref()].dependents {
            if let Some(count) = indegree.get_mut(dependent.as_ref()) {
                *count -= 1;
            }
        }
    }
    Ok(order)
}

/// Depth-first search over the not-yet-emitted derived nodes; revisiting a
/// node on the current path is the cycle.
fn find_cycle(
    nodes: &IndexMap<Arc<str>, NodeInfo>,
    derived_order: &[Arc<str>],
    emitted: &BTreeSet<&str>,
) -> BuildError {
    fn visit(
        name: &Arc<str>,
        nodes: &IndexMap<Arc<str>, NodeInfo>,
        path: &mut Vec<Arc<str>>,
        done: &mut BTreeSet<Arc<str>>,
    ) -> Option<Vec<Arc<str>>> {
        if let Some(position) = path.iter().position(|on_path| on_path == name) {
            let mut cycle = path[position..].to_vec();
            cycle.push(name.clone());
            return Some(cycle);
        }
        if done.contains(name) {
            return None;
        }
        path.push(name.clone());
        for dependency in &nodes[name.as_ref()].dependencies {
            if nodes
                .get(dependency.as_ref())
                .is_some_and(|info| info.is_derived)
            {
                if let Some(cycle) = visit(dependency, nodes, path, done) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        done.insert(name.clone());
        None
    }

    let mut done = BTreeSet::new();
    for name in derived_order {
        if emitted.contains(name.as_ref()) {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = visit(name, nodes, &mut path, &mut done) {
            return BuildError::CyclicDependency { path: cycle };
        }
    }
    // Kahn stalled, so a cycle must exist.
    unreachable!("no topological progress without a cycle")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(
        fields: &[&str],
        derived: &[(&str, &[&str])],
    ) -> Result<DependencyGraph, BuildError> {
        DependencyGraph::build(
            fields.iter().map(|name| Arc::from(*name)),
            derived.iter().map(|(name, dependencies)| {
                (
                    Arc::from(*name),
                    dependencies.iter().map(|dependency| Arc::from(*dependency)).collect(),
                )
            }),
        )
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let graph = graph(
            &["count"],
            &[
                ("quadrupled", &["doubled"]),
                ("doubled", &["count"]),
            ],
        )
        .unwrap();
        let order: Vec<&str> = graph
            .topological_order()
            .iter()
            .map(|name| name.as_ref())
            .collect();
        assert_eq!(order, ["doubled", "quadrupled"]);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let graph = graph(
            &["a"],
            &[("third", &["a"]), ("first", &["a"]), ("second", &["a"])],
        )
        .unwrap();
        let order: Vec<&str> = graph
            .topological_order()
            .iter()
            .map(|name| name.as_ref())
            .collect();
        assert_eq!(order, ["third", "first", "second"]);
    }

    #[test]
    fn diamond_dependents() {
        let graph = graph(
            &["base"],
            &[
                ("left", &["base"]),
                ("right", &["base"]),
                ("join", &["left", "right"]),
            ],
        )
        .unwrap();
        let stale = graph.transitive_dependents([Arc::from("base")]);
        assert_eq!(stale.len(), 3);
        let direct: Vec<&str> = graph
            .dependents_of("base")
            .iter()
            .map(|name| name.as_ref())
            .collect();
        assert_eq!(direct, ["left", "right"]);
    }

    #[test]
    fn cycle_is_rejected_and_named() {
        let error = graph(
            &["x"],
            &[("a", &["b"]), ("b", &["c"]), ("c", &["a"])],
        )
        .unwrap_err();
        let BuildError::CyclicDependency { path } = error else {
            panic!("expected cycle error, got {error:?}");
        };
        assert_eq!(path.first(), path.last());
        assert!(path.len() >= 3);
    }

    #[test]
    fn self_cycle_is_rejected() {
        let error = graph(&[], &[("a", &["a"])]).unwrap_err();
        assert!(matches!(error, BuildError::CyclicDependency { .. }));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let error = graph(&["x"], &[("a", &["missing"])]).unwrap_err();
        assert!(matches!(error, BuildError::UnknownDependency { .. }));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let error = graph(&["x"], &[("x", &[])]).unwrap_err();
        assert!(matches!(error, BuildError::DuplicateName { .. }));
    }
}
