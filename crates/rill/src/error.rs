//! Error taxonomy.
//!
//! Build-time errors are fatal to the component build and carry the
//! offending node name. Runtime compute failures are isolated per node and
//! never crash a session. Protocol-level staleness (stale confirmations,
//! suppressed pushes) is steady-state behavior, not an error, and has no
//! variant here.

use std::sync::Arc;
use thiserror::Error;

/// Fatal component build errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The dependency graph contains a cycle. The path lists the nodes on
    /// the cycle, first node repeated at the end.
    #[error("cyclic dependency: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<Arc<str>> },

    #[error("duplicate declaration of `{name}`")]
    DuplicateName { name: Arc<str> },

    #[error("`{node}` depends on unknown name `{dependency}`")]
    UnknownDependency { node: Arc<str>, dependency: Arc<str> },

    #[error("failed to parse expression for `{node}`: {message}")]
    Parse { node: Arc<str>, message: String },
}

/// A construct with no client equivalent. Non-fatal: the owning node stays
/// server-evaluable but is excluded from client mirroring.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("`{construct}` cannot be mirrored on the client: {reason}")]
pub struct Untranspilable {
    pub construct: Arc<str>,
    pub reason: Arc<str>,
}

/// A derivation failed at runtime. The node keeps its prior value and is
/// retried on the next triggering change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("derivation `{node}` failed: {message}")]
pub struct ComputeFailure {
    pub node: Arc<str>,
    pub message: Arc<str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_names_the_cycle() {
        let err = BuildError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }
}
