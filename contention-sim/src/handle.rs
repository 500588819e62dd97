//! Thread-safe access to a shared session.

use std::sync::Arc;

use contention_core::{Result, StateModel};
use parking_lot::Mutex;

use crate::session::{SessionSnapshot, SimulationSession};
use crate::simulator::{StepOutcome, step};

/// Cloneable handle that serializes steps on one session.
///
/// Every clone refers to the same session, so concurrent callers never
/// observe a half-applied step.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<SimulationSession>>,
}

impl SessionHandle {
    /// Wraps `session` for shared use.
    pub fn new(session: SimulationSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Advances the shared session by one step.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidInput` - `draw` is not in `[0, 1)` or the
    ///   session's current state does not exist in `model`
    pub fn step(&self, model: &StateModel, draw: f64) -> Result<StepOutcome> {
        step(&mut self.inner.lock(), model, draw)
    }

    /// Copy of the session's renderable fields.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot()
    }

    /// Resets the shared session.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Runs `f` with the session locked.
    pub fn with_session<T>(&self, f: impl FnOnce(&SimulationSession) -> T) -> T {
        f(&self.inner.lock())
    }
}
