//! Animation phase state machine.
//!
//! For a field whose presence gates a transient UI element (e.g. a modal
//! keyed by an optional id): `Idle → Entering → (Loading) → Visible →
//! Exiting → Idle`. Transitions are driven by value-presence changes and
//! two external signals, `TransitionEnd` and `AsyncReady`.
//!
//! Timers are effects handed back to the host, never scheduled here, so
//! the machine stays deterministic. The fallback timer rescues a missed
//! `TransitionEnd` (an element can be removed before its transition
//! listener runs); exiting always ends on a fixed timer because the exit
//! target is being torn down and cannot reliably call back.

use crate::field::AnimatedConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationPhase {
    Idle,
    Entering,
    Loading,
    Visible,
    Exiting,
}

/// Host-visible notifications emitted by transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseNotice {
    /// Async content became ready while still entering.
    ContentReadyDuringEnter,
    /// Async content refreshed while visible.
    Refresh,
}

/// What the host must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEffect {
    /// Arm the entering fallback timer; on expiry call
    /// [`PhaseMachine::on_fallback_timer`].
    StartFallbackTimer(Duration),
    /// Arm the fixed exit timer; on expiry call
    /// [`PhaseMachine::on_exit_timer`].
    StartExitTimer(Duration),
    Notify(PhaseNotice),
}

#[derive(Debug)]
pub struct PhaseMachine {
    config: AnimatedConfig,
    phase: AnimationPhase,
    async_ready: bool,
}

impl PhaseMachine {
    pub fn new(config: AnimatedConfig) -> Self {
        Self {
            config,
            phase: AnimationPhase::Idle,
            async_ready: false,
        }
    }

    pub fn phase(&self) -> AnimationPhase {
        self.phase
    }

    /// Value-presence change: `true` when the gating field became
    /// non-null (open), `false` when it became null (close).
    pub fn on_presence(&mut self, present: bool) -> Vec<PhaseEffect> {
        match (self.phase, present) {
            (AnimationPhase::Idle, true) => self.enter(),
            // Interrupted exit: re-enter immediately.
            (AnimationPhase::Exiting, true) => self.enter(),
            (
                AnimationPhase::Entering | AnimationPhase::Loading | AnimationPhase::Visible,
                false,
            ) => {
                self.phase = AnimationPhase::Exiting;
                vec![PhaseEffect::StartExitTimer(self.config.exit)]
            }
            _ => Vec::new(),
        }
    }

    fn enter(&mut self) -> Vec<PhaseEffect> {
        self.phase = AnimationPhase::Entering;
        self.async_ready = false;
        vec![PhaseEffect::StartFallbackTimer(
            self.config.fallback_deadline(),
        )]
    }

    /// The enter transition finished (delegate callback).
    pub fn on_transition_end(&mut self) -> Vec<PhaseEffect> {
        match self.phase {
            AnimationPhase::Entering => self.finish_enter(),
            _ => Vec::new(),
        }
    }

    /// Fallback timer expiry: forces the entering transition forward when
    /// the `TransitionEnd` signal never arrived. Ignored once the machine
    /// already moved on.
    pub fn on_fallback_timer(&mut self) -> Vec<PhaseEffect> {
        match self.phase {
            AnimationPhase::Entering => self.finish_enter(),
            _ => Vec::new(),
        }
    }

    fn finish_enter(&mut self) -> Vec<PhaseEffect> {
        if self.config.has_async_content && !self.async_ready {
            self.phase = AnimationPhase::Loading;
        } else {
            self.phase = AnimationPhase::Visible;
        }
        Vec::new()
    }

    /// Async content arrived.
    pub fn on_async_ready(&mut self) -> Vec<PhaseEffect> {
        match self.phase {
            AnimationPhase::Entering => {
                self.async_ready = true;
                vec![PhaseEffect::Notify(PhaseNotice::ContentReadyDuringEnter)]
            }
            AnimationPhase::Loading => {
                self.async_ready = true;
                self.phase = AnimationPhase::Visible;
                Vec::new()
            }
            AnimationPhase::Visible => vec![PhaseEffect::Notify(PhaseNotice::Refresh)],
            _ => Vec::new(),
        }
    }

    /// Fixed exit timer expiry. Ignored if the exit was interrupted by a
    /// re-open.
    pub fn on_exit_timer(&mut self) -> Vec<PhaseEffect> {
        if self.phase == AnimationPhase::Exiting {
            self.phase = AnimationPhase::Idle;
        }
        Vec::new()
    }
}
