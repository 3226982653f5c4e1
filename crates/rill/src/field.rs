//! Field declarations.
//!
//! Fields are declared at component build time; names are unique per
//! component and types are fixed for the field's lifetime. Lifetime
//! metadata governs reconnection behavior and is consumed by the store's
//! partitioning; the engine itself treats all three partitions uniformly.

use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;

/// How a field survives reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Durable, shareable across sessions of the same user.
    Shareable,
    /// Durable, private to one session.
    Private,
    /// Discarded when the instance ends.
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Primitive,
    Array,
    Record,
}

/// Animation timing for a field whose presence gates a transient UI
/// element. `enter` and `exit` are the transition durations; the fallback
/// timer fires at `enter + fallback_margin` if no TransitionEnd arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimatedConfig {
    pub enter: Duration,
    pub exit: Duration,
    pub fallback_margin: Duration,
    /// The element loads content asynchronously after entering.
    pub has_async_content: bool,
}

impl AnimatedConfig {
    pub fn new(enter: Duration, exit: Duration) -> Self {
        Self {
            enter,
            exit,
            fallback_margin: Duration::from_millis(50),
            has_async_content: false,
        }
    }

    pub fn with_async_content(mut self) -> Self {
        self.has_async_content = true;
        self
    }

    pub fn fallback_deadline(&self) -> Duration {
        self.enter + self.fallback_margin
    }
}

/// One named, typed slot of state.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Arc<str>,
    pub ty: FieldType,
    pub lifetime: Lifetime,
    /// Eligible for client mirroring.
    pub optimistic: bool,
    pub animated: Option<AnimatedConfig>,
    pub default: Value,
}

impl FieldDef {
    pub fn new(name: impl Into<Arc<str>>, ty: FieldType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            lifetime: Lifetime::Transient,
            optimistic: false,
            animated: None,
            default,
        }
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn optimistic(mut self) -> Self {
        self.optimistic = true;
        self
    }

    pub fn animated(mut self, config: AnimatedConfig) -> Self {
        self.animated = Some(config);
        self
    }
}
