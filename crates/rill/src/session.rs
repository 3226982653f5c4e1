//! Per-connection evaluation session.
//!
//! One logical evaluation context per connected client; no shared mutable
//! state between sessions. All mutations funnel through `&mut self`
//! methods, which makes the single-writer rule a compile-time property.
//! Async derivations are handed to an injected dispatcher; their results
//! come back through the session's own channel and are applied in
//! completion order, with stale revisions discarded by the evaluator.

use crate::component::Component;
use crate::eval::{AsyncDispatch, Evaluator, RecomputeOutcome};
use crate::store::Snapshot;
use crate::value::Value;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures_channel::mpsc;
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

/// Runs a future to completion, somewhere. The session does not care
/// whether that is a thread pool, a single-threaded executor or inline.
pub type Dispatcher = Arc<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>;

struct AsyncOutcome {
    node: Arc<str>,
    revision: u64,
    result: Result<Value, String>,
}

pub struct Session {
    id: Ulid,
    evaluator: Evaluator,
    outcome_tx: mpsc::UnboundedSender<AsyncOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<AsyncOutcome>,
    dispatcher: Dispatcher,
}

impl Session {
    pub fn new(component: Arc<Component>, dispatcher: Dispatcher) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded();
        Self {
            id: Ulid::new(),
            evaluator: Evaluator::new(component),
            outcome_tx,
            outcome_rx,
            dispatcher,
        }
    }

    /// Session with an inline dispatcher: async derivations run to
    /// completion on the calling thread. Useful for tests and simple
    /// hosts; production hosts inject their executor's spawn.
    pub fn new_inline(component: Arc<Component>) -> Self {
        Self::new(
            component,
            Arc::new(|future| futures::executor::block_on(future)),
        )
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.evaluator.value(name)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.evaluator.snapshot()
    }

    pub fn component(&self) -> &Arc<Component> {
        self.evaluator.component()
    }

    /// Hydrate initial field values and evaluate every derivation once.
    /// Returns the full projection for the first render.
    pub fn hydrate(&mut self, initial: &Snapshot) -> Snapshot {
        let outcome = self.evaluator.initialize(initial);
        let mut projection = self.evaluator.snapshot();
        projection.extend(self.dispatch(outcome));
        projection
    }

    /// The mutation entry point: apply changed fields, recompute, return
    /// the changed values for projection to rendering and mirrored cells.
    pub fn apply(&mut self, fields_changed: Snapshot) -> Snapshot {
        let outcome = self.evaluator.apply(fields_changed);
        self.dispatch(outcome)
    }

    /// An externally-triggered value change (push channel): same path
    /// as a mutation, the field simply was not changed by this session.
    pub fn apply_external(&mut self, name: Arc<str>, value: Value) -> Snapshot {
        self.apply(Snapshot::from([(name, value)]))
    }

    /// Drain completed async derivations, applying each in completion
    /// order. Returns the union of changed values.
    pub fn drain_async(&mut self) -> Snapshot {
        let mut changed = Snapshot::new();
        while let Ok(Some(outcome)) = self.outcome_rx.try_next() {
            let pass = self
                .evaluator
                .apply_async_result(outcome.node, outcome.revision, outcome.result);
            changed.extend(self.dispatch(pass));
        }
        changed
    }

    pub fn diagnostics(&self) -> &crate::component::Diagnostics {
        self.evaluator.component().diagnostics()
    }

    fn dispatch(&mut self, outcome: RecomputeOutcome) -> Snapshot {
        for AsyncDispatch {
            node,
            revision,
            future,
        } in outcome.dispatches
        {
            debug!(node = node.as_ref(), revision, "dispatching async derivation");
            let tx = self.outcome_tx.clone();
            (self.dispatcher)(
                async move {
                    let result = future.await;
                    // Receiver dropped means the session ended; nothing to do.
                    let _ = tx.unbounded_send(AsyncOutcome {
                        node,
                        revision,
                        result,
                    });
                }
                .boxed(),
            );
        }
        outcome.changed
    }
}
