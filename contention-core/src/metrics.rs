//! Aggregate performance metrics derived from the stationary distribution.

use serde::{Deserialize, Serialize};

use crate::model::StateModel;
use crate::solver::SteadyStateDistribution;
use crate::{ChainError, Result};

/// Long-run performance of one class among `device_count` contenders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Average per-slot transmission probability (τ)
    pub tau: f64,
    /// Probability a transmission collides (γ)
    pub gamma: f64,
    /// Normalized throughput (η)
    pub eta: f64,
}

/// Computes τ, γ and η.
///
/// - τ = Σ π(i) × CP(i)
/// - γ = 1 − (1 − τ)^(n−1)
/// - η = n × τ × (1 − γ)
///
/// # Errors
///
/// - `ChainError::InvalidInput` - `device_count` is zero or the
///   distribution does not cover every state of `model`
pub fn compute_metrics(
    model: &StateModel,
    steady_state: &SteadyStateDistribution,
    device_count: u32,
) -> Result<PerformanceMetrics> {
    if device_count < 1 {
        return Err(ChainError::InvalidInput {
            reason: "device count must be at least 1".to_string(),
        });
    }

    if steady_state.len() != model.len() {
        return Err(ChainError::InvalidInput {
            reason: format!(
                "distribution covers {} states, model has {}",
                steady_state.len(),
                model.len()
            ),
        });
    }

    let tau: f64 = model
        .states()
        .iter()
        .zip(steady_state.iter())
        .map(|(state, weight)| weight * state.contention_probability)
        .sum();

    let others = i32::try_from(device_count - 1).unwrap_or(i32::MAX);
    let gamma = 1.0 - (1.0 - tau).powi(others);
    let eta = f64::from(device_count) * tau * (1.0 - gamma);

    Ok(PerformanceMetrics { tau, gamma, eta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build_states;
    use crate::priority::UserPriority;
    use crate::solver::SteadyStateSolver;
    use crate::transition::TransitionMatrix;

    fn metrics_for(class: UserPriority, device_count: u32) -> PerformanceMetrics {
        let model = build_states(&class.config().unwrap(), device_count).unwrap();
        let matrix = TransitionMatrix::from_model(&model);
        let steady = SteadyStateSolver::default().solve(&model, &matrix).unwrap();
        compute_metrics(&model, &steady, device_count).unwrap()
    }

    #[test]
    fn test_up0_two_devices() {
        let metrics = metrics_for(UserPriority::Up0, 2);

        // π = [1, 0.125, 1/30] / (139/120)
        let expected_tau = (0.125 * 1.125 + 0.0625 / 30.0) * 120.0 / 139.0;
        assert!((metrics.tau - expected_tau).abs() < 1e-12);
        assert!((metrics.tau - 0.1226).abs() < 1e-3);

        // With one other device γ equals τ
        assert!((metrics.gamma - metrics.tau).abs() < 1e-12);
        assert!((metrics.eta - 2.0 * metrics.tau * (1.0 - metrics.tau)).abs() < 1e-12);
        assert!((metrics.eta - 0.2151).abs() < 1e-3);
    }

    #[test]
    fn test_single_device_has_no_collisions() {
        let metrics = metrics_for(UserPriority::Up3, 1);
        assert_eq!(metrics.gamma, 0.0);
        assert_eq!(metrics.eta, metrics.tau);
        assert_eq!(metrics.tau, 0.25);
    }

    #[test]
    fn test_higher_priority_transmits_more() {
        let up0 = metrics_for(UserPriority::Up0, 2);
        let up5 = metrics_for(UserPriority::Up5, 2);
        assert!(up5.tau > up0.tau);
        assert!(up5.tau > 0.3);
    }

    #[test]
    fn test_input_validation() {
        let model = build_states(&UserPriority::Up0.config().unwrap(), 2).unwrap();
        let steady = SteadyStateDistribution::new(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            compute_metrics(&model, &steady, 0),
            Err(ChainError::InvalidInput { .. })
        ));

        let short = SteadyStateDistribution::new(vec![0.5, 0.5]).unwrap();
        assert!(matches!(
            compute_metrics(&model, &short, 2),
            Err(ChainError::InvalidInput { .. })
        ));
    }
}
