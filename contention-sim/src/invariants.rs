//! Invariant checking framework for simulation validation.

use std::fmt;

use contention_core::StateModel;
use serde::Serialize;

use crate::session::SimulationSession;

/// Violation of a simulation invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Step count when the violation was detected
    pub step: u64,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at step {}: {}",
            self.invariant, self.step, self.description
        )
    }
}

/// Trait for checking session invariants after each step.
pub trait Invariant: Send + Sync {
    /// Checks if invariant holds for the session driven by `model`.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the invariant condition is not met.
    fn check(&self, session: &SimulationSession, model: &StateModel)
    -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;

    /// Builds a violation of this invariant at the session's current step.
    fn violation(&self, session: &SimulationSession, description: String) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            description,
            step: session.step_count(),
        }
    }
}

/// Current state stays within `[0, last_index]`.
pub struct StateRangeInvariant;

impl Invariant for StateRangeInvariant {
    fn check(
        &self,
        session: &SimulationSession,
        model: &StateModel,
    ) -> Result<(), InvariantViolation> {
        let current = session.current_state_index();
        if current > model.last_index() {
            return Err(self.violation(
                session,
                format!("state {current} exceeds ceiling {}", model.last_index()),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "StateRange"
    }
}

/// History stays within capacity and its step numbers strictly increase.
pub struct HistoryBoundInvariant;

impl Invariant for HistoryBoundInvariant {
    fn check(
        &self,
        session: &SimulationSession,
        _model: &StateModel,
    ) -> Result<(), InvariantViolation> {
        let length = session.history().len();
        if length > session.history_capacity() {
            return Err(self.violation(
                session,
                format!(
                    "history holds {length} records, capacity is {}",
                    session.history_capacity()
                ),
            ));
        }

        let steps: Vec<u64> = session.history().map(|record| record.step).collect();
        if steps.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(self.violation(session, format!("history steps out of order: {steps:?}")));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "HistoryBound"
    }
}

/// The newest record ends where the session is and carries its step count.
pub struct StepContinuityInvariant;

impl Invariant for StepContinuityInvariant {
    fn check(
        &self,
        session: &SimulationSession,
        _model: &StateModel,
    ) -> Result<(), InvariantViolation> {
        let Some(last) = session.last_transition() else {
            return Ok(());
        };

        if last.to != session.current_state_index() || last.step != session.step_count() {
            return Err(self.violation(
                session,
                format!(
                    "last record {} -> {} at step {} disagrees with state {} at step {}",
                    last.from,
                    last.to,
                    last.step,
                    session.current_state_index(),
                    session.step_count()
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "StepContinuity"
    }
}

/// Invariants every driver checks unless told otherwise.
pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(StateRangeInvariant),
        Box::new(HistoryBoundInvariant),
        Box::new(StepContinuityInvariant),
    ]
}
