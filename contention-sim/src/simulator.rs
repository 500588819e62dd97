//! One-step advancement of the backoff chain.
//!
//! The draw is split into three consecutive intervals sized by the current
//! state's success, collision and idle probabilities; whichever interval it
//! lands in is the slot's event.

use contention_core::transition::successor;
use contention_core::{BackoffState, ChainError, ChannelEvent, Result, StateModel};
use tracing::trace;

use crate::session::{SimulationSession, TransitionRecord};

/// Result of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// State after the step
    pub next_state: usize,
    /// Event realized in the slot
    pub event: ChannelEvent,
    /// Record appended to the session history
    pub record: TransitionRecord,
}

/// Maps a draw to the slot event and successor state without touching any
/// session. Identical inputs always give identical outputs.
pub fn classify(state: &BackoffState, last_index: usize, draw: f64) -> (usize, ChannelEvent) {
    let success_bound = state.success_probability;
    let collision_bound = success_bound + state.collision_probability;

    let event = if draw < success_bound {
        ChannelEvent::Success
    } else if draw < collision_bound {
        ChannelEvent::Collision
    } else {
        ChannelEvent::Idle
    };

    (successor(state.index, event, last_index), event)
}

/// Advances `session` by one Markov step of `model` using `draw`.
///
/// Validation happens before any mutation, so a rejected call leaves the
/// session untouched.
///
/// # Errors
///
/// - `ChainError::InvalidInput` - `draw` is not in `[0, 1)` or the session's
///   current state does not exist in `model`
pub fn step(session: &mut SimulationSession, model: &StateModel, draw: f64) -> Result<StepOutcome> {
    if !(0.0..1.0).contains(&draw) {
        return Err(ChainError::InvalidInput {
            reason: format!("random draw {draw} is outside [0, 1)"),
        });
    }

    let from = session.current_state_index();
    let state = model.state(from).ok_or_else(|| ChainError::InvalidInput {
        reason: format!(
            "session is in state {from} but the model only has {} states",
            model.len()
        ),
    })?;

    let (next_state, event) = classify(state, model.last_index(), draw);
    let record = session.apply(from, next_state, event);

    trace!(step = record.step, from, to = next_state, %event, draw, "Chain step");

    Ok(StepOutcome {
        next_state,
        event,
        record,
    })
}
