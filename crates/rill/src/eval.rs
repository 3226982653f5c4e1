//! Incremental evaluator.
//!
//! Given the set of changed fields, expands to the transitive dependents,
//! runs the stale derived nodes in topological order and reports exactly
//! the names whose stored value changed. Synchronous nodes write inline so
//! later nodes in the same pass observe fresh inputs; asynchronous nodes
//! are dispatched out-of-band with a revision token and leave `Pending`
//! behind until their result arrives.
//!
//! A failing node keeps its prior value, records a `ComputeFailure` and
//! stays dirty (together with its dependents) for the next triggering
//! change. One failure never aborts the pass or the session.

use crate::component::{Component, Compute};
use crate::error::ComputeFailure;
use crate::store::{Snapshot, ValueStore};
use crate::value::Value;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// An async derivation handed to the host for execution. The revision
/// token must accompany the result back into
/// [`Evaluator::apply_async_result`].
pub struct AsyncDispatch {
    pub node: Arc<str>,
    pub revision: u64,
    pub future: BoxFuture<'static, Result<Value, String>>,
}

/// Result of one recompute pass.
#[derive(Default)]
pub struct RecomputeOutcome {
    /// Names whose stored value actually changed, with the new values.
    /// This is what gets projected outward; unchanged recomputations do
    /// not appear.
    pub changed: Snapshot,
    /// Async derivations to run out-of-band.
    pub dispatches: Vec<AsyncDispatch>,
}

/// Per-instance evaluation state over an immutable [`Component`].
pub struct Evaluator {
    component: Arc<Component>,
    store: ValueStore,
    /// Last failure per node, cleared on the next successful compute.
    errors: BTreeMap<Arc<str>, ComputeFailure>,
    /// Nodes that must recompute on the next pass regardless of the seeds.
    retry: BTreeSet<Arc<str>>,
    /// Latest dispatch revision per async node; stale results are dropped.
    dispatched: BTreeMap<Arc<str>, u64>,
    revision: u64,
}

impl Evaluator {
    pub fn new(component: Arc<Component>) -> Self {
        let store = ValueStore::from_fields(
            component.fields().iter(),
            component.nodes().map(|node| node.name.clone()),
        );
        Self {
            component,
            store,
            errors: BTreeMap::new(),
            retry: BTreeSet::new(),
            dispatched: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.store.get(name)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn last_error(&self, name: &str) -> Option<&ComputeFailure> {
        self.errors.get(name)
    }

    /// Overlay hydrated values, then compute every derived node once.
    pub fn initialize(&mut self, hydration: &Snapshot) -> RecomputeOutcome {
        self.store.hydrate(hydration);
        let all: BTreeSet<Arc<str>> = self
            .component
            .graph()
            .topological_order()
            .iter()
            .cloned()
            .collect();
        self.run_pass(Snapshot::new(), all)
    }

    /// Mutation entry point: write the changed fields, then recompute
    /// their transitive dependents.
    pub fn apply(&mut self, fields_changed: Snapshot) -> RecomputeOutcome {
        self.revision += 1;
        let mut seeds = Snapshot::new();
        for (name, value) in fields_changed {
            if !self.store.contains(&name) || self.component.graph().is_derived(&name) {
                continue;
            }
            let previous = self.store.set(&name, value.clone());
            if previous.as_ref() != Some(&value) {
                seeds.insert(name, value);
            }
        }
        self.run_pass(seeds, BTreeSet::new())
    }

    /// Deliver an async derivation's result. Stale revisions (a newer
    /// dispatch of the same node exists) are discarded; fresh results are
    /// written and trigger a scoped recompute of the node's dependents.
    pub fn apply_async_result(
        &mut self,
        node: Arc<str>,
        revision: u64,
        result: Result<Value, String>,
    ) -> RecomputeOutcome {
        if self.dispatched.get(&node) != Some(&revision) {
            // Superseded dispatch: expected steady-state, not an error.
            return RecomputeOutcome::default();
        }
        self.dispatched.remove(&node);

        match result {
            Ok(value) => {
                let previous = self.store.set(&node, value.clone());
                self.errors.remove(&node);
                self.retry.remove(&node);
                if previous.as_ref() == Some(&value) {
                    return RecomputeOutcome::default();
                }
                let mut seeds = Snapshot::new();
                seeds.insert(node, value);
                self.run_pass(seeds, BTreeSet::new())
            }
            Err(message) => {
                self.record_failure(node, message);
                RecomputeOutcome::default()
            }
        }
    }

    /// One evaluation pass. `seeds` are names already written (with their
    /// new values); `force` adds derived nodes to recompute regardless.
    fn run_pass(&mut self, seeds: Snapshot, force: BTreeSet<Arc<str>>) -> RecomputeOutcome {
        let component = self.component.clone();
        let graph = component.graph();

        // DirtySet: transitive dependents of everything that changed, plus
        // nodes awaiting retry, plus forced nodes.
        let mut dirty = graph.transitive_dependents(
            seeds
                .keys()
                .cloned()
                .chain(self.retry.iter().cloned())
                .chain(force.iter().cloned()),
        );
        dirty.extend(self.retry.iter().cloned());
        dirty.extend(force);

        let mut outcome = RecomputeOutcome {
            changed: seeds,
            ..Default::default()
        };
        if dirty.is_empty() {
            return outcome;
        }
        debug!(
            component = self.component.name(),
            revision = self.revision,
            dirty = dirty.len(),
            "recompute pass"
        );

        let mut snapshot = self.store.snapshot();
        let mut failed: Vec<Arc<str>> = Vec::new();

        for name in graph.topological_order() {
            if !dirty.contains(name) {
                continue;
            }
            let node = component
                .node(name)
                .expect("topological order only contains derived nodes");

            match &node.compute {
                Compute::Sync(compute) => match compute(&snapshot) {
                    Ok(value) => {
                        self.errors.remove(name);
                        self.retry.remove(name);
                        let previous = self.store.set(name, value.clone());
                        snapshot.insert(name.clone(), value.clone());
                        if previous.as_ref() != Some(&value) {
                            outcome.changed.insert(name.clone(), value);
                        }
                    }
                    Err(message) => {
                        failed.push(name.clone());
                        self.record_failure(name.clone(), message);
                    }
                },
                Compute::Async(compute) => {
                    self.dispatched.insert(name.clone(), self.revision);
                    let future = compute(&snapshot);
                    outcome.dispatches.push(AsyncDispatch {
                        node: name.clone(),
                        revision: self.revision,
                        future,
                    });
                    let previous = self.store.set(name, Value::Pending);
                    snapshot.insert(name.clone(), Value::Pending);
                    if previous != Some(Value::Pending) {
                        outcome.changed.insert(name.clone(), Value::Pending);
                    }
                }
            }
        }

        // Failed nodes and their dependents stay dirty so the next
        // triggering change retries them against fresh inputs.
        for name in failed {
            self.retry
                .extend(graph.transitive_dependents([name.clone()]));
            self.retry.insert(name);
        }

        outcome
    }

    fn record_failure(&mut self, node: Arc<str>, message: String) {
        warn!(node = node.as_ref(), %message, "derivation failed; prior value retained");
        self.errors.insert(
            node.clone(),
            ComputeFailure {
                node: node.clone(),
                message: message.into(),
            },
        );
        self.retry.insert(node);
    }
}
