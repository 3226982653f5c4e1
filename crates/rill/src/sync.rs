//! Client synchronization runtime.
//!
//! Mirrors the optimistic subset of a component on the client: versioned
//! value cells, local recomputation of mirrored derivations, and the
//! reconciliation protocol against server confirmations and pushes.
//!
//! The rules, per cell:
//! - a local mutation bumps `version` and wins over anything older;
//! - a confirmation is applied only when it carries the cell's current
//!   version; late replies for superseded versions are discarded;
//! - an external push is dropped while the cell has unconfirmed local
//!   changes, so a user's in-flight edit is never visibly reverted.
//!
//! Staleness outcomes are protocol no-ops, not errors; nothing here logs
//! them as failures.

use crate::component::Component;
use crate::expr::CompiledExpr;
use crate::store::Snapshot;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;
use ulid::Ulid;

/// Client-side versioned value holder for one optimistic field or
/// mirrored derived node.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedCell {
    pub value: Value,
    pub confirmed_value: Value,
    /// Monotonic, bumped on every local mutation.
    pub version: u64,
    pub confirmed_version: u64,
}

impl SyncedCell {
    fn new(initial: Value) -> Self {
        Self {
            value: initial.clone(),
            confirmed_value: initial,
            version: 0,
            confirmed_version: 0,
        }
    }

    /// `version != confirmed_version`: a local change awaits confirmation.
    pub fn is_pending(&self) -> bool {
        self.version != self.confirmed_version
    }
}

/// Confirmation request for the server, tagged with the version it
/// confirms.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRequest {
    pub field: Arc<str>,
    pub version: u64,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Applied,
    /// A newer local mutation superseded the confirmed version.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Applied,
    /// The cell has unconfirmed local changes; the push is dropped.
    DroppedPending,
}

/// Result of a local mutation: what to send to the server and what
/// changed locally (for re-rendering), mirrored derivations included.
#[derive(Debug, Default)]
pub struct MutationOutcome {
    pub request: Option<ConfirmationRequest>,
    pub changed: Snapshot,
}

/// Keyed array mutation result: replace the matched element or remove it
/// entirely (the reserved sentinel, e.g. decrement to zero removes).
pub enum KeyedResult {
    Update(Value),
    Remove,
}

struct MirroredNode {
    name: Arc<str>,
    expression: CompiledExpr,
}

/// One component instance's client runtime. An explicit object keyed by
/// instance id; cells never live in a process-global registry.
pub struct ClientRuntime {
    instance: Ulid,
    component: Arc<Component>,
    /// Lazily populated: a cell exists after the first local mutation or
    /// server contact for its name.
    cells: IndexMap<Arc<str>, SyncedCell>,
    /// Mirrored derived nodes in client topological order.
    nodes: Vec<MirroredNode>,
    defaults: Snapshot,
}

impl ClientRuntime {
    pub fn new(component: Arc<Component>, instance: Ulid) -> Self {
        let nodes = component
            .graph()
            .topological_order()
            .iter()
            .filter_map(|name| {
                let node = component.node(name)?;
                if !node.optimistic {
                    return None;
                }
                let expression = node.expression.clone()?;
                Some(MirroredNode {
                    name: name.clone(),
                    expression,
                })
            })
            .collect();
        let defaults: Snapshot = component
            .mirrored_fields()
            .map(|field| (field.name.clone(), field.default.clone()))
            .collect();
        Self {
            instance,
            component,
            cells: IndexMap::new(),
            nodes,
            defaults,
        }
    }

    pub fn instance(&self) -> Ulid {
        self.instance
    }

    pub fn cell(&self, name: &str) -> Option<&SyncedCell> {
        self.cells.get(name)
    }

    /// Current optimistic value (default before any mutation or push).
    pub fn value(&self, name: &str) -> Option<Value> {
        if let Some(cell) = self.cells.get(name) {
            return Some(cell.value.clone());
        }
        self.defaults.get(name).cloned()
    }

    fn cell_mut(&mut self, name: &Arc<str>) -> &mut SyncedCell {
        let initial = self.defaults.get(name).cloned().unwrap_or(Value::Unit);
        self.cells
            .entry(name.clone())
            .or_insert_with(|| SyncedCell::new(initial))
    }

    /// Apply a state mutation immediately, ahead of server confirmation.
    pub fn local_mutate(&mut self, field: impl Into<Arc<str>>, new_value: Value) -> MutationOutcome {
        let field = field.into();
        // Equal-value check against the current (cell or default) value
        // before touching the cell map, so a no-op never materializes a
        // cell.
        if self.value(&field).as_ref() == Some(&new_value) {
            return MutationOutcome::default();
        }
        let cell = self.cell_mut(&field);
        cell.version += 1;
        cell.value = new_value.clone();
        let request = ConfirmationRequest {
            field: field.clone(),
            version: cell.version,
            value: new_value.clone(),
        };

        let mut changed = Snapshot::from([(field.clone(), new_value)]);
        self.recompute_optimistic(&field, &mut changed);
        MutationOutcome {
            request: Some(request),
            changed,
        }
    }

    /// Keyed mutation for array-of-record fields: apply `mutator` to the
    /// element whose `key_field` equals `key`. No matching element is a
    /// no-op.
    pub fn mutate_keyed(
        &mut self,
        field: impl Into<Arc<str>>,
        key_field: &str,
        key: &Value,
        mutator: impl FnOnce(&Value) -> KeyedResult,
    ) -> MutationOutcome {
        let field = field.into();
        let Some(current) = self.value(&field) else {
            return MutationOutcome::default();
        };
        let Some(items) = current.as_list() else {
            return MutationOutcome::default();
        };
        let Some(position) = items
            .iter()
            .position(|item| item.get_field(key_field) == Some(key))
        else {
            return MutationOutcome::default();
        };
        let mut items = items.to_vec();
        match mutator(&items[position]) {
            KeyedResult::Update(new_element) => items[position] = new_element,
            KeyedResult::Remove => {
                items.remove(position);
            }
        }
        self.local_mutate(field, Value::list(items))
    }

    /// A server reply to this client's own mutation. Accepted only when no
    /// newer local mutation happened since the request was sent.
    pub fn confirm_from_server(
        &mut self,
        field: impl Into<Arc<str>>,
        reply: Value,
        reply_version: u64,
    ) -> (ConfirmOutcome, Snapshot) {
        let field = field.into();
        let cell = self.cell_mut(&field);
        if reply_version != cell.version {
            return (ConfirmOutcome::Stale, Snapshot::new());
        }
        cell.confirmed_version = reply_version;
        cell.confirmed_value = reply.clone();
        let mut changed = Snapshot::new();
        if cell.value != reply {
            cell.value = reply.clone();
            changed.insert(field.clone(), reply);
            self.recompute_optimistic(&field, &mut changed);
        }
        self.reconcile_confirmed();
        (ConfirmOutcome::Applied, changed)
    }

    /// An externally-triggered server value change (not a reply to this
    /// client). Dropped while the cell is pending.
    pub fn server_push(
        &mut self,
        field: impl Into<Arc<str>>,
        new_value: Value,
    ) -> (PushOutcome, Snapshot) {
        let field = field.into();
        let cell = self.cell_mut(&field);
        if cell.is_pending() {
            return (PushOutcome::DroppedPending, Snapshot::new());
        }
        if cell.value == new_value && cell.confirmed_value == new_value {
            return (PushOutcome::Applied, Snapshot::new());
        }
        cell.value = new_value.clone();
        cell.confirmed_value = new_value.clone();
        let mut changed = Snapshot::from([(field.clone(), new_value)]);
        self.recompute_optimistic(&field, &mut changed);
        self.reconcile_confirmed();
        (PushOutcome::Applied, changed)
    }

    /// Optimistic snapshot: cell values overlaid on mirrored defaults.
    pub fn optimistic_snapshot(&self) -> Snapshot {
        let mut snapshot = self.defaults.clone();
        for (name, cell) in &self.cells {
            snapshot.insert(name.clone(), cell.value.clone());
        }
        snapshot
    }

    /// Re-run mirrored derivations that transitively depend on `seed`, in
    /// client topological order, against the optimistic snapshot.
    fn recompute_optimistic(&mut self, seed: &Arc<str>, changed: &mut Snapshot) {
        let stale = self
            .component
            .graph()
            .transitive_dependents([seed.clone()]);
        let mut snapshot = self.optimistic_snapshot();
        for index in 0..self.nodes.len() {
            let name = self.nodes[index].name.clone();
            if !stale.contains(&name) {
                continue;
            }
            // A failing client derivation keeps its previous value; the
            // server remains authoritative for it.
            let Ok(value) = self.nodes[index].expression.evaluate(&snapshot) else {
                continue;
            };
            snapshot.insert(name.clone(), value.clone());
            let cell = self.cell_mut(&name);
            if cell.value != value {
                cell.version += 1;
                cell.value = value.clone();
                changed.insert(name, value);
            }
        }
    }

    /// Recompute the confirmed side of mirrored derivations from confirmed
    /// inputs; a derived cell whose optimistic value matches its confirmed
    /// value is no longer pending.
    fn reconcile_confirmed(&mut self) {
        let mut snapshot = self.defaults.clone();
        for (name, cell) in &self.cells {
            snapshot.insert(name.clone(), cell.confirmed_value.clone());
        }
        for index in 0..self.nodes.len() {
            let name = self.nodes[index].name.clone();
            let Ok(value) = self.nodes[index].expression.evaluate(&snapshot) else {
                continue;
            };
            snapshot.insert(name.clone(), value.clone());
            let cell = self.cell_mut(&name);
            cell.confirmed_value = value;
            if cell.value == cell.confirmed_value {
                cell.confirmed_version = cell.version;
            }
        }
    }
}
