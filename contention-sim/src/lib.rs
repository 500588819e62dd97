//! Contention Sim - Step-driven simulation of the backoff chain
//!
//! A [`SimulationSession`] is advanced one slot at a time by [`step`], which
//! turns a uniform draw into the slot's event. [`ChainDriver`] runs many
//! steps from a [`RandomSource`], checks invariants after each one and
//! compares the visited states with the analytic steady state.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]

pub mod driver;
pub mod handle;
pub mod invariants;
pub mod rng;
pub mod session;
pub mod simulator;

pub use driver::{ChainDriver, SimulationError, SimulationReport, StateOccupancy};
pub use handle::SessionHandle;
pub use invariants::{
    HistoryBoundInvariant, Invariant, InvariantViolation, StateRangeInvariant,
    StepContinuityInvariant, default_invariants,
};
pub use rng::{DeterministicRng, RandomSource, SequenceSource};
pub use session::{
    DEFAULT_HISTORY_CAPACITY, EventCounts, SessionSnapshot, SimulationSession, TransitionRecord,
};
pub use simulator::{StepOutcome, classify, step};
