//! Contention Core - Backoff-state Markov chain for prioritized slotted access
//!
//! This crate models the contention behaviour of one IEEE 802.15.6-style
//! traffic class as a discrete-time Markov chain: every consecutive contention
//! failure moves the device one backoff state further, each state carries a
//! contention probability, and from those probabilities the crate derives
//! per-slot event likelihoods, the stationary distribution and the aggregate
//! transmission rate, collision rate and throughput.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]

pub mod analysis;
pub mod config;
pub mod metrics;
pub mod model;
pub mod priority;
pub mod solver;
pub mod tracing_setup;
pub mod transition;

// Re-export main types for convenient access
pub use analysis::ClassAnalysis;
pub use config::ContentionConfig;
pub use metrics::{PerformanceMetrics, compute_metrics};
pub use model::{BackoffState, ChannelEvent, StateModel, StateSnapshot, build_states};
pub use priority::{PriorityClassConfig, UserPriority, get_config};
pub use solver::{SolverMethod, SteadyStateDistribution, SteadyStateSolver, fixed_point_residual};
pub use transition::TransitionMatrix;

/// Tolerance used when checking that probabilities sum to one.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Errors raised by the chain engine.
///
/// All variants are deterministic validation failures raised before any
/// state is mutated; retrying with the same input fails the same way.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    /// Priority class parameters are malformed
    #[error("Invalid class configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration
        reason: String,
    },

    /// Stationary distribution cannot be normalized
    #[error("Singular chain: {reason}")]
    SingularChain {
        /// Which quantity degenerated
        reason: String,
    },

    /// Caller supplied an out-of-contract argument
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Which argument was rejected
        reason: String,
    },
}

impl ChainError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            ChainError::InvalidConfig { reason } => {
                format!("The priority class settings are not usable: {reason}")
            }
            ChainError::SingularChain { reason } => {
                format!("The chain has no steady state for these settings: {reason}")
            }
            ChainError::InvalidInput { reason } => format!("Rejected input: {reason}"),
        }
    }
}

/// Result type alias for chain engine operations.
pub type Result<T> = std::result::Result<T, ChainError>;
