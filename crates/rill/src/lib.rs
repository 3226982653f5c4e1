//! Rill: reactive state and derivation engine for server-driven UIs.
//!
//! The server holds canonical state, derives values from it and projects
//! changed values to a thin client; a restricted expression language is
//! compiled once into both a server evaluator and equivalent client
//! source, and an optimistic synchronization protocol lets the client
//! apply mutations ahead of server confirmation.
//!
//! The moving parts, bottom up:
//! - [`value`] / [`field`] / [`store`]: the value model and the per-field
//!   lifetime-partitioned store;
//! - [`expr`]: lexer, parser, server evaluator and client emitter for the
//!   expression language;
//! - [`graph`] / [`eval`]: the dependency graph and the incremental
//!   evaluator over it;
//! - [`component`] / [`session`]: build-time component compilation and the
//!   per-connection evaluation session;
//! - [`sync`] / [`phase`]: the client-side versioned cells, reconciliation
//!   protocol and animation phase machine.

pub mod component;
pub mod error;
pub mod eval;
pub mod expr;
pub mod field;
pub mod graph;
pub mod phase;
pub mod session;
pub mod store;
pub mod sync;
pub mod value;

pub use component::{Component, ComponentSpec, Compute, DerivedDef, DerivedKind, Diagnostics};
pub use error::{BuildError, ComputeFailure, Untranspilable};
pub use eval::{AsyncDispatch, Evaluator, RecomputeOutcome};
pub use expr::{CompiledExpr, compile};
pub use field::{AnimatedConfig, FieldDef, FieldType, Lifetime};
pub use graph::DependencyGraph;
pub use phase::{AnimationPhase, PhaseEffect, PhaseMachine, PhaseNotice};
pub use session::Session;
pub use store::{Snapshot, ValueStore};
pub use sync::{
    ClientRuntime, ConfirmOutcome, ConfirmationRequest, KeyedResult, MutationOutcome, PushOutcome,
    SyncedCell,
};
pub use value::Value;
