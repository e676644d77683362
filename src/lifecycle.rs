//! Lifecycle Controller: the explicit `INITIALIZING → HEALTHY ⇄ DEGRADED →
//! SHUTTING_DOWN → STOPPED` state machine, decoupled from the HTTP server so
//! both the dispatcher and the health subsystem can read it cheaply.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// The five lifecycle states from the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Registry not yet populated or listener not yet bound.
    Initializing,
    /// Serving traffic, all dependencies connected.
    Healthy,
    /// Serving traffic, at least one dependency unavailable.
    Degraded,
    /// Listener closed, draining in-flight requests.
    ShuttingDown,
    /// Process is exiting.
    Stopped,
}

impl LifecycleState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::Healthy => 1,
            Self::Degraded => 2,
            Self::ShuttingDown => 3,
            Self::Stopped => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initializing,
            1 => Self::Healthy,
            2 => Self::Degraded,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

/// Shared, lock-free lifecycle state. Cheap to read from the hot request path.
#[derive(Clone)]
pub struct Lifecycle {
    state: Arc<AtomicU8>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LifecycleState::Initializing.to_u8())),
        }
    }
}

impl Lifecycle {
    /// Current state.
    #[must_use]
    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Transition to a new state. No transition validity checks are
    /// enforced here; `gateway::Server::run` is the only caller and drives
    /// transitions in the correct order.
    pub fn set(&self, state: LifecycleState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Whether `/call-tool` should accept work right now.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        matches!(self.get(), LifecycleState::Healthy | LifecycleState::Degraded)
    }

    /// Derive `Healthy`/`Degraded` from a dependency snapshot and apply it,
    /// but only while not shutting down or stopped.
    pub fn sync_with_dependencies(&self, all_connected: bool) {
        if matches!(self.get(), LifecycleState::ShuttingDown | LifecycleState::Stopped) {
            return;
        }
        self.set(if all_connected {
            LifecycleState::Healthy
        } else {
            LifecycleState::Degraded
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_initializing() {
        assert_eq!(Lifecycle::default().get(), LifecycleState::Initializing);
    }

    #[test]
    fn is_serving_only_in_healthy_or_degraded() {
        let lifecycle = Lifecycle::default();
        assert!(!lifecycle.is_serving());
        lifecycle.set(LifecycleState::Healthy);
        assert!(lifecycle.is_serving());
        lifecycle.set(LifecycleState::Degraded);
        assert!(lifecycle.is_serving());
        lifecycle.set(LifecycleState::ShuttingDown);
        assert!(!lifecycle.is_serving());
    }

    #[test]
    fn sync_with_dependencies_ignored_once_shutting_down() {
        let lifecycle = Lifecycle::default();
        lifecycle.set(LifecycleState::ShuttingDown);
        lifecycle.sync_with_dependencies(true);
        assert_eq!(lifecycle.get(), LifecycleState::ShuttingDown);
    }
}
