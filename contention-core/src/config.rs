//! Centralized configuration for the contention engine.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the workspace.

use crate::priority::UserPriority;
use crate::solver::{SolverMethod, SteadyStateSolver};

/// Central configuration for all contention components.
///
/// Groups related settings into logical sections and supports environment
/// variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct ContentionConfig {
    /// Scenario parameters
    pub model: ModelConfig,
    /// Steady-state solver settings
    pub solver: SolverConfig,
    /// Session and driver settings
    pub simulation: SimulationConfig,
}

/// Scenario parameters shared by analysis and simulation.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Contending devices, the tagged device included
    pub device_count: u32,
    /// Class used when a command does not name one
    pub default_class: UserPriority,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            device_count: 2,
            default_class: UserPriority::Up0,
        }
    }
}

/// Stationary distribution solver settings.
#[derive(Debug, Clone, Default)]
pub struct SolverConfig {
    /// Algorithm used for the stationary distribution
    pub method: SolverMethod,
}

impl SolverConfig {
    /// Builds a solver from these settings.
    pub fn solver(&self) -> SteadyStateSolver {
        SteadyStateSolver::new(self.method)
    }
}

/// Simulation session and driver settings.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Transition records kept per session
    pub history_capacity: usize,
    /// Seed for reproducible runs (None = OS entropy)
    pub deterministic_seed: Option<u64>,
    /// Invariant violations tolerated before a driver stops the run
    pub max_recorded_violations: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            deterministic_seed: None,
            max_recorded_violations: 10,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            deterministic_seed: Some(42), // Fixed seed for reproducible tests
            ..Default::default()
        }
    }
}

impl ContentionConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(devices) = std::env::var("CONTENTION_DEVICE_COUNT") {
            if let Ok(count) = devices.parse::<u32>() {
                config.model.device_count = count;
            }
        }

        if let Ok(class) = std::env::var("CONTENTION_DEFAULT_CLASS") {
            if let Ok(priority) = class.parse::<UserPriority>() {
                config.model.default_class = priority;
            }
        }

        if let Ok(method) = std::env::var("CONTENTION_SOLVER") {
            if let Ok(method) = method.parse::<SolverMethod>() {
                config.solver.method = method;
            }
        }

        if let Ok(seed) = std::env::var("CONTENTION_SEED") {
            if let Ok(seed_value) = seed.parse::<u64>() {
                config.simulation.deterministic_seed = Some(seed_value);
            }
        }

        if let Ok(capacity) = std::env::var("CONTENTION_HISTORY_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                config.simulation.history_capacity = capacity;
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }
}
