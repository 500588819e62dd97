//! Per-class analysis bundle.
//!
//! The model, transition matrix, stationary distribution and metrics of a
//! class are derived together once and kept read-only; a changed class
//! configuration means a new analysis.

use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::{PerformanceMetrics, compute_metrics};
use crate::model::{StateModel, build_states};
use crate::priority::PriorityClassConfig;
use crate::solver::{SteadyStateDistribution, SteadyStateSolver, fixed_point_residual};
use crate::transition::TransitionMatrix;
use crate::{PROBABILITY_EPSILON, Result};

/// Everything derived from one class configuration and contender count.
#[derive(Debug, Clone, Serialize)]
pub struct ClassAnalysis {
    model: StateModel,
    matrix: TransitionMatrix,
    steady_state: SteadyStateDistribution,
    metrics: PerformanceMetrics,
    residual: f64,
}

impl ClassAnalysis {
    /// Builds the state model and derives every quantity from it.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidInput` - `device_count` is zero
    /// - `ChainError::InvalidConfig` - Class parameters are malformed
    /// - `ChainError::SingularChain` - No stationary distribution exists
    pub fn analyze(
        config: &PriorityClassConfig,
        device_count: u32,
        solver: SteadyStateSolver,
    ) -> Result<Self> {
        let model = build_states(config, device_count)?;
        let matrix = TransitionMatrix::from_model(&model);
        let steady_state = solver.solve(&model, &matrix)?;
        let metrics = compute_metrics(&model, &steady_state, device_count)?;
        let residual = fixed_point_residual(&steady_state, &matrix)?;

        if residual > PROBABILITY_EPSILON {
            warn!(residual, method = %solver.method(), "Steady state is not a tight fixed point");
        }

        debug!(
            tau = metrics.tau,
            gamma = metrics.gamma,
            eta = metrics.eta,
            "Analyzed priority class"
        );

        Ok(Self {
            model,
            matrix,
            steady_state,
            metrics,
            residual,
        })
    }

    /// Backoff states of the class.
    pub fn model(&self) -> &StateModel {
        &self.model
    }

    /// Transition matrix of the chain.
    pub fn matrix(&self) -> &TransitionMatrix {
        &self.matrix
    }

    /// Stationary distribution.
    pub fn steady_state(&self) -> &SteadyStateDistribution {
        &self.steady_state
    }

    /// τ, γ and η.
    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
    }

    /// Largest deviation of `π × P` from `π`.
    pub fn residual(&self) -> f64 {
        self.residual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainError;
    use crate::priority::UserPriority;
    use crate::solver::SolverMethod;

    #[test]
    fn test_analysis_is_consistent() {
        let config = UserPriority::Up0.config().unwrap();
        let analysis = ClassAnalysis::analyze(&config, 2, SteadyStateSolver::default()).unwrap();

        assert_eq!(analysis.model().len(), 3);
        assert_eq!(analysis.matrix().size(), 3);
        assert_eq!(analysis.steady_state().len(), 3);
        assert!(analysis.residual() < 1e-12);
        assert!((analysis.metrics().tau - 0.1232).abs() < 1e-4);
    }

    #[test]
    fn test_analysis_propagates_input_errors() {
        let config = UserPriority::Up0.config().unwrap();
        assert!(matches!(
            ClassAnalysis::analyze(&config, 0, SteadyStateSolver::new(SolverMethod::Linear)),
            Err(ChainError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_priority_ordering_across_classes() {
        let tau = |class: UserPriority| {
            ClassAnalysis::analyze(&class.config().unwrap(), 2, SteadyStateSolver::default())
                .unwrap()
                .metrics()
                .tau
        };
        assert!(tau(UserPriority::Up5) > tau(UserPriority::Up0));
        assert!(tau(UserPriority::Up3) > tau(UserPriority::Up0));
        assert!(tau(UserPriority::Up6) > tau(UserPriority::Up3));
    }

    #[test]
    fn test_analysis_serializes_for_display() {
        let analysis = ClassAnalysis::analyze(
            &UserPriority::Up0.config().unwrap(),
            2,
            SteadyStateSolver::default(),
        )
        .unwrap();

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["model"]["device_count"], 2);
        assert_eq!(json["model"]["states"].as_array().unwrap().len(), 3);
        assert_eq!(json["matrix"]["rows"].as_array().unwrap().len(), 3);
        assert!(json["metrics"]["tau"].as_f64().unwrap() > 0.12);
    }
}
