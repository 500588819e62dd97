//! Stationary distribution of the backoff chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::StateModel;
use crate::transition::TransitionMatrix;
use crate::{ChainError, PROBABILITY_EPSILON, Result};

/// Magnitude below which a normalization sum or elimination pivot is
/// treated as zero.
const SINGULARITY_THRESHOLD: f64 = 1e-15;

/// Algorithm used to find the stationary distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SolverMethod {
    /// Forward substitution along the forward-on-collision, reset-on-success
    /// structure
    #[default]
    BirthDeath,
    /// Gaussian elimination of `π = πP` with `Σπ = 1`
    Linear,
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMethod::BirthDeath => write!(f, "birth-death"),
            SolverMethod::Linear => write!(f, "linear"),
        }
    }
}

impl FromStr for SolverMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "birth-death" | "birth_death" | "forward" => Ok(SolverMethod::BirthDeath),
            "linear" | "gaussian" => Ok(SolverMethod::Linear),
            _ => Err(format!("Invalid solver method: {s}")),
        }
    }
}

/// Long-run fraction of slots spent in each state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SteadyStateDistribution {
    probabilities: Vec<f64>,
}

impl SteadyStateDistribution {
    /// Validates and wraps a distribution.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidInput` - An entry is negative or non-finite, or
    ///   the entries do not sum to one
    pub fn new(probabilities: Vec<f64>) -> Result<Self> {
        if let Some(bad) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(ChainError::InvalidInput {
                reason: format!("distribution entry {bad} is not a probability"),
            });
        }

        let total: f64 = probabilities.iter().sum();
        if (total - 1.0).abs() > PROBABILITY_EPSILON {
            return Err(ChainError::InvalidInput {
                reason: format!("distribution sums to {total}"),
            });
        }

        Ok(Self { probabilities })
    }

    /// Probability of state `index`; zero outside the chain.
    pub fn probability(&self, index: usize) -> f64 {
        self.probabilities.get(index).copied().unwrap_or(0.0)
    }

    /// All probabilities, fresh state first.
    pub fn as_slice(&self) -> &[f64] {
        &self.probabilities
    }

    /// Number of states covered.
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    /// True when the distribution covers no states.
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Iterates over the probabilities in state order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.probabilities.iter().copied()
    }
}

/// Solves stationary distributions with a configurable method.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteadyStateSolver {
    method: SolverMethod,
}

impl SteadyStateSolver {
    /// Creates a solver using `method`.
    pub fn new(method: SolverMethod) -> Self {
        Self { method }
    }

    /// Method this solver uses.
    pub fn method(&self) -> SolverMethod {
        self.method
    }

    /// Solves the stationary distribution of `model` whose transitions are
    /// described by `matrix`.
    ///
    /// # Errors
    ///
    /// - `ChainError::InvalidInput` - Matrix and model disagree on the
    ///   number of states
    /// - `ChainError::SingularChain` - The chain has no unique normalizable
    ///   stationary distribution
    pub fn solve(
        &self,
        model: &StateModel,
        matrix: &TransitionMatrix,
    ) -> Result<SteadyStateDistribution> {
        if matrix.size() != model.len() {
            return Err(ChainError::InvalidInput {
                reason: format!(
                    "matrix has {} states, model has {}",
                    matrix.size(),
                    model.len()
                ),
            });
        }

        let distribution = match self.method {
            SolverMethod::BirthDeath => solve_birth_death(model, matrix)?,
            SolverMethod::Linear => solve_linear_system(matrix)?,
        };

        debug!(method = %self.method, distribution = ?distribution.as_slice(), "Solved steady state");
        Ok(distribution)
    }
}

/// Solves by forward substitution: `π[i+1] = π[i] × collision(i) / outflow(i+1)`,
/// then normalizes.
///
/// Exact for the reset-on-success chain because the only inflow to state
/// `i+1` other than its own self-loop is the collision from state `i`.
/// Outflow is read from the event probabilities rather than `1 − self_loop`:
/// an interior state is left on success or collision, the ceiling only on
/// success.
///
/// # Errors
///
/// - `ChainError::SingularChain` - A state can never be left or a weight
///   overflows
pub fn solve_birth_death(
    model: &StateModel,
    matrix: &TransitionMatrix,
) -> Result<SteadyStateDistribution> {
    let last_index = model.last_index();
    let mut weights = Vec::with_capacity(model.len());
    weights.push(1.0);

    for (index, state) in model.states().iter().enumerate().skip(1) {
        let outflow = if index == last_index {
            state.success_probability
        } else {
            state.success_probability + state.collision_probability
        };
        if outflow == 0.0 {
            return Err(ChainError::SingularChain {
                reason: format!("state {} is never left", state.index),
            });
        }

        let weight = weights[index - 1] * matrix.probability(index - 1, index) / outflow;
        if !weight.is_finite() {
            return Err(ChainError::SingularChain {
                reason: format!("weight of state {} is {weight}", state.index),
            });
        }
        weights.push(weight);
    }

    normalize(weights)
}

/// Solves `π(P − I) = 0` with the last balance equation replaced by
/// `Σπ = 1`, using Gaussian elimination with partial pivoting.
///
/// Makes no assumption about the transition topology.
///
/// # Errors
///
/// - `ChainError::SingularChain` - The system has no unique solution
pub fn solve_linear_system(matrix: &TransitionMatrix) -> Result<SteadyStateDistribution> {
    let size = matrix.size();
    if size == 0 {
        return Err(ChainError::SingularChain {
            reason: "chain has no states".to_string(),
        });
    }

    // Row j holds the balance equation of state j: Σ_i π_i (P[i][j] − δ_ij) = 0
    let mut system: Vec<Vec<f64>> = (0..size)
        .map(|j| {
            let mut equation: Vec<f64> = (0..size)
                .map(|i| matrix.probability(i, j) - if i == j { 1.0 } else { 0.0 })
                .collect();
            equation.push(0.0);
            equation
        })
        .collect();
    system[size - 1] = vec![1.0; size + 1];

    for column in 0..size {
        let pivot_row = (column..size)
            .max_by(|&a, &b| system[a][column].abs().total_cmp(&system[b][column].abs()))
            .unwrap_or(column);

        if system[pivot_row][column].abs() < SINGULARITY_THRESHOLD {
            return Err(ChainError::SingularChain {
                reason: format!("no usable pivot for state {column}"),
            });
        }
        system.swap(column, pivot_row);

        let pivot = system[column].clone();
        for (row_index, row) in system.iter_mut().enumerate() {
            if row_index == column {
                continue;
            }
            let factor = row[column] / pivot[column];
            if factor != 0.0 {
                for (value, pivot_value) in row.iter_mut().zip(&pivot).skip(column) {
                    *value -= factor * pivot_value;
                }
            }
        }
    }

    let solution = system
        .iter()
        .enumerate()
        .map(|(index, row)| clamp_round_off(index, row[size] / row[index]))
        .collect::<Result<Vec<f64>>>()?;

    normalize(solution)
}

/// Zeroes negative round-off; anything further below zero means elimination
/// did not produce a distribution.
fn clamp_round_off(index: usize, value: f64) -> Result<f64> {
    if value.is_finite() && value > -PROBABILITY_EPSILON {
        Ok(value.max(0.0))
    } else {
        Err(ChainError::SingularChain {
            reason: format!("state {index} solved to {value}"),
        })
    }
}

fn normalize(weights: Vec<f64>) -> Result<SteadyStateDistribution> {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total.abs() < SINGULARITY_THRESHOLD {
        return Err(ChainError::SingularChain {
            reason: format!("normalization sum is {total}"),
        });
    }

    SteadyStateDistribution::new(weights.into_iter().map(|w| w / total).collect())
}

/// Largest absolute difference between `distribution × P` and `distribution`.
///
/// # Errors
///
/// - `ChainError::InvalidInput` - Distribution length differs from the
///   number of states
pub fn fixed_point_residual(
    distribution: &SteadyStateDistribution,
    matrix: &TransitionMatrix,
) -> Result<f64> {
    let propagated = matrix.apply(distribution.as_slice())?;
    Ok(propagated
        .iter()
        .zip(distribution.iter())
        .map(|(next, current)| (next - current).abs())
        .fold(0.0, f64::max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build_states;
    use crate::priority::{PriorityClassConfig, UserPriority};

    fn solve_class(class: UserPriority, method: SolverMethod) -> SteadyStateDistribution {
        let model = build_states(&class.config().unwrap(), 2).unwrap();
        let matrix = TransitionMatrix::from_model(&model);
        SteadyStateSolver::new(method).solve(&model, &matrix).unwrap()
    }

    #[test]
    fn test_up0_reference_distribution() {
        let distribution = solve_class(UserPriority::Up0, SolverMethod::BirthDeath);
        let expected = [0.8636, 0.1080, 0.0288];
        for (actual, expected) in distribution.iter().zip(expected) {
            assert!((actual - expected).abs() < 0.01, "{actual} vs {expected}");
        }

        // π1 = π0 × 0.125 and π2 = π1 × 0.015625 / 0.05859375
        assert!((distribution.probability(1) / distribution.probability(0) - 0.125).abs() < 1e-12);
        assert!(
            (distribution.probability(2) / distribution.probability(1) - 0.015625 / 0.05859375)
                .abs()
                < 1e-12
        );
    }

    #[test]
    fn test_methods_agree() {
        for class in UserPriority::ALL {
            let forward = solve_class(class, SolverMethod::BirthDeath);
            let linear = solve_class(class, SolverMethod::Linear);
            for (a, b) in forward.iter().zip(linear.iter()) {
                assert!((a - b).abs() < 1e-9, "{class}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_solution_is_fixed_point() {
        let model = build_states(&UserPriority::Up4.config().unwrap(), 3).unwrap();
        let matrix = TransitionMatrix::from_model(&model);
        for method in [SolverMethod::BirthDeath, SolverMethod::Linear] {
            let distribution = SteadyStateSolver::new(method).solve(&model, &matrix).unwrap();
            assert!(fixed_point_residual(&distribution, &matrix).unwrap() < 1e-12);
        }
    }

    #[test]
    fn test_single_device_ceiling_is_never_reached() {
        // Without other devices there are no collisions, so all mass stays fresh
        let model = build_states(&UserPriority::Up0.config().unwrap(), 1).unwrap();
        let matrix = TransitionMatrix::from_model(&model);
        let distribution = SteadyStateSolver::default().solve(&model, &matrix).unwrap();
        assert_eq!(distribution.as_slice(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_vanishing_success_is_singular() {
        // (1 - CP)^(n-1) underflows to zero for a huge contender count
        let config = PriorityClassConfig::new(0.9, 0.9, 1).unwrap();
        let model = build_states(&config, 1_000_000).unwrap();
        let matrix = TransitionMatrix::from_model(&model);
        assert!(matches!(
            SteadyStateSolver::default().solve(&model, &matrix),
            Err(ChainError::SingularChain { .. })
        ));
    }

    #[test]
    fn test_methods_agree_when_ceiling_is_rarely_left() {
        // Ceiling success is 7.25e-17 at n = 41 and 8.7e-19 at n = 60
        for (config, devices) in [
            (PriorityClassConfig::new(0.6, 0.6, 1).unwrap(), 41),
            (PriorityClassConfig::new(0.6, 0.6, 1).unwrap(), 38),
            (PriorityClassConfig::new(0.5, 0.5, 2).unwrap(), 60),
        ] {
            let model = build_states(&config, devices).unwrap();
            let matrix = TransitionMatrix::from_model(&model);
            let forward = SteadyStateSolver::new(SolverMethod::BirthDeath)
                .solve(&model, &matrix)
                .unwrap();
            let linear = SteadyStateSolver::new(SolverMethod::Linear)
                .solve(&model, &matrix)
                .unwrap();

            for (a, b) in forward.iter().zip(linear.iter()) {
                assert!((a - b).abs() < 1e-9, "n = {devices}: {a} vs {b}");
            }
            assert!((forward.probability(model.last_index()) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ceiling_ratio_is_exact_for_rare_success() {
        let config = PriorityClassConfig::new(0.6, 0.6, 1).unwrap();
        let model = build_states(&config, 38).unwrap();
        let matrix = TransitionMatrix::from_model(&model);
        let distribution = SteadyStateSolver::default().solve(&model, &matrix).unwrap();

        let fresh = model.state(0).unwrap();
        let ceiling = model.state(1).unwrap();
        let expected = fresh.collision_probability / ceiling.success_probability;
        let actual = distribution.probability(1) / distribution.probability(0);
        assert!(((actual - expected) / expected).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_round_off() {
        assert_eq!(clamp_round_off(0, 0.25).unwrap(), 0.25);
        assert_eq!(clamp_round_off(0, -1e-17).unwrap(), 0.0);
        assert!(matches!(
            clamp_round_off(1, -1e-3),
            Err(ChainError::SingularChain { .. })
        ));
        assert!(clamp_round_off(2, f64::NAN).is_err());
    }

    #[test]
    fn test_mismatched_matrix_rejected() {
        let small = build_states(&UserPriority::Up0.config().unwrap(), 2).unwrap();
        let large = build_states(&UserPriority::Up2.config().unwrap(), 2).unwrap();
        let matrix = TransitionMatrix::from_model(&large);
        assert!(matches!(
            SteadyStateSolver::default().solve(&small, &matrix),
            Err(ChainError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_distribution_validation() {
        assert!(SteadyStateDistribution::new(vec![0.5, 0.5]).is_ok());
        assert!(SteadyStateDistribution::new(vec![0.5, 0.6]).is_err());
        assert!(SteadyStateDistribution::new(vec![1.5, -0.5]).is_err());
    }

    #[test]
    fn test_solver_method_parsing() {
        assert_eq!("linear".parse::<SolverMethod>().unwrap(), SolverMethod::Linear);
        assert_eq!(
            "Birth-Death".parse::<SolverMethod>().unwrap(),
            SolverMethod::BirthDeath
        );
        assert!("cholesky".parse::<SolverMethod>().is_err());
    }
}
