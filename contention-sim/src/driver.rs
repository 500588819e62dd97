//! Synchronous multi-step runner for one class analysis.

use contention_core::config::SimulationConfig;
use contention_core::{ChainError, ClassAnalysis};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::invariants::{Invariant, InvariantViolation, default_invariants};
use crate::rng::{DeterministicRng, RandomSource};
use crate::session::{EventCounts, SimulationSession};
use crate::simulator::{StepOutcome, step};

/// Errors that can occur while driving a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The chain engine rejected a step or a setting
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Too many invariant violations occurred
    #[error("Too many invariant violations: {count}")]
    TooManyInvariantViolations {
        /// Number of violations that occurred
        count: usize,
    },
}

impl SimulationError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SimulationError::Chain(err) => err.user_message(),
            SimulationError::TooManyInvariantViolations { count } => {
                format!("The simulation stopped after {count} consistency failures")
            }
        }
    }
}

/// Time a state was occupied during a run next to its stationary share.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateOccupancy {
    /// Backoff state
    pub index: usize,
    /// Slots spent in the state
    pub visits: u64,
    /// Fraction of slots spent in the state
    pub empirical: f64,
    /// Stationary probability of the state
    pub analytic: f64,
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Seed used for reproduction, absent for injected sources
    pub seed: Option<u64>,
    /// Steps taken since the session was last reset
    pub steps: u64,
    /// State the session ended in
    pub final_state: usize,
    /// Per-event tallies
    pub event_counts: EventCounts,
    /// Per-state visits against the steady state
    pub occupancy: Vec<StateOccupancy>,
    /// Fraction of slots in which the device transmitted
    pub empirical_tau: f64,
    /// Transmission probability from the steady state
    pub analytic_tau: f64,
    /// Invariant violations seen during the run
    pub violations: Vec<InvariantViolation>,
    /// Whether the run completed without violations
    pub success: bool,
}

impl SimulationReport {
    /// Largest gap between a state's empirical and stationary share.
    pub fn max_occupancy_deviation(&self) -> f64 {
        self.occupancy
            .iter()
            .map(|state| (state.empirical - state.analytic).abs())
            .fold(0.0, f64::max)
    }

    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        match self.seed {
            Some(seed) => summary.push_str(&format!("Simulation Report (seed: {seed})\n")),
            None => summary.push_str("Simulation Report (injected draws)\n"),
        }
        summary.push_str(&format!("Steps: {}\n", self.steps));
        summary.push_str(&format!("Final state: {}\n", self.final_state));
        summary.push_str(&format!("Success: {}\n", self.success));

        summary.push_str("\nEvent breakdown:\n");
        summary.push_str(&format!("  success: {}\n", self.event_counts.success));
        summary.push_str(&format!("  collision: {}\n", self.event_counts.collision));
        summary.push_str(&format!("  idle: {}\n", self.event_counts.idle));

        summary.push_str("\nOccupancy (empirical / steady state):\n");
        for state in &self.occupancy {
            summary.push_str(&format!(
                "  state {}: {:.4} / {:.4} ({} slots)\n",
                state.index, state.empirical, state.analytic, state.visits
            ));
        }

        summary.push_str(&format!(
            "\nTransmission rate: {:.4} empirical, {:.4} analytic\n",
            self.empirical_tau, self.analytic_tau
        ));

        if !self.violations.is_empty() {
            summary.push_str("\nInvariant violations:\n");
            for violation in &self.violations {
                summary.push_str(&format!("  - {violation}\n"));
            }
        }

        summary
    }
}

/// Drives one session of one class analysis with a random source.
pub struct ChainDriver {
    analysis: ClassAnalysis,
    session: SimulationSession,
    source: Box<dyn RandomSource + Send>,
    seed: Option<u64>,
    invariants: Vec<Box<dyn Invariant>>,
    violations: Vec<InvariantViolation>,
    max_violations: usize,
}

impl ChainDriver {
    /// Creates a driver seeded from `config`, or from fresh entropy when no
    /// seed is configured. Either way the seed ends up in the report.
    ///
    /// # Errors
    /// - `SimulationError::Chain` - History capacity in `config` is zero
    pub fn new(
        analysis: ClassAnalysis,
        config: &SimulationConfig,
    ) -> Result<Self, SimulationError> {
        let rng = match config.deterministic_seed {
            Some(seed) => DeterministicRng::from_seed(seed),
            None => DeterministicRng::from_entropy(),
        };
        let seed = rng.seed();

        let mut driver = Self::with_source(analysis, rng, config)?;
        driver.seed = Some(seed);
        Ok(driver)
    }

    /// Creates a driver that takes its draws from `source`.
    ///
    /// # Errors
    /// - `SimulationError::Chain` - History capacity in `config` is zero
    pub fn with_source<R>(
        analysis: ClassAnalysis,
        source: R,
        config: &SimulationConfig,
    ) -> Result<Self, SimulationError>
    where
        R: RandomSource + Send + 'static,
    {
        Ok(Self {
            analysis,
            session: SimulationSession::with_history_capacity(config.history_capacity)?,
            source: Box::new(source),
            seed: None,
            invariants: default_invariants(),
            violations: Vec::new(),
            max_violations: config.max_recorded_violations.max(1),
        })
    }

    /// Adds an invariant to check after every step.
    pub fn add_invariant(&mut self, invariant: Box<dyn Invariant>) {
        self.invariants.push(invariant);
    }

    /// Seed of the random source, if it was seeded by the driver.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Analysis being simulated.
    pub fn analysis(&self) -> &ClassAnalysis {
        &self.analysis
    }

    /// Session being advanced.
    pub fn session(&self) -> &SimulationSession {
        &self.session
    }

    /// Violations recorded since the last reset.
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Draws once and advances the session by one step.
    ///
    /// # Errors
    /// - `SimulationError::Chain` - The source produced a draw outside `[0, 1)`
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn advance(&mut self) -> Result<StepOutcome, SimulationError> {
        let draw = self.source.next_draw();
        let outcome = step(&mut self.session, self.analysis.model(), draw)?;
        self.check_invariants()?;
        Ok(outcome)
    }

    /// Advances `steps` times and reports on the whole session.
    ///
    /// # Errors
    /// - `SimulationError::Chain` - The source produced a draw outside `[0, 1)`
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn run(&mut self, steps: u64) -> Result<SimulationReport, SimulationError> {
        self.run_with(steps, |_| {})
    }

    /// Like [`ChainDriver::run`], handing every outcome to `observer`.
    ///
    /// # Errors
    /// - `SimulationError::Chain` - The source produced a draw outside `[0, 1)`
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn run_with<F>(
        &mut self,
        steps: u64,
        mut observer: F,
    ) -> Result<SimulationReport, SimulationError>
    where
        F: FnMut(&StepOutcome),
    {
        for _ in 0..steps {
            let outcome = self.advance()?;
            observer(&outcome);
        }

        let report = self.report();
        info!(
            seed = ?report.seed,
            steps = report.steps,
            final_state = report.final_state,
            empirical_tau = report.empirical_tau,
            analytic_tau = report.analytic_tau,
            violations = report.violations.len(),
            "Simulation run finished"
        );
        Ok(report)
    }

    /// Returns the session to the fresh state and forgets violations.
    pub fn reset(&mut self) {
        self.session.reset();
        self.violations.clear();
    }

    /// Simulates a different class from the fresh state.
    pub fn switch_class(&mut self, analysis: ClassAnalysis) {
        debug!(
            from_states = self.analysis.model().len(),
            to_states = analysis.model().len(),
            "Switching class"
        );
        self.analysis = analysis;
        self.reset();
    }

    /// Builds a report of the session so far.
    pub fn report(&self) -> SimulationReport {
        let steady = self.analysis.steady_state();
        let occupancy = (0..self.analysis.model().len())
            .map(|index| StateOccupancy {
                index,
                visits: self.session.occupancy().get(index).copied().unwrap_or(0),
                empirical: self.session.visit_frequency(index),
                analytic: steady.probability(index),
            })
            .collect();

        let steps = self.session.step_count();
        let event_counts = self.session.event_counts();
        let empirical_tau = if steps == 0 {
            0.0
        } else {
            event_counts.transmissions() as f64 / steps as f64
        };

        SimulationReport {
            seed: self.seed,
            steps,
            final_state: self.session.current_state_index(),
            event_counts,
            occupancy,
            empirical_tau,
            analytic_tau: self.analysis.metrics().tau,
            violations: self.violations.clone(),
            success: self.violations.is_empty(),
        }
    }

    fn check_invariants(&mut self) -> Result<(), SimulationError> {
        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(&self.session, self.analysis.model()) {
                warn!(%violation, "Invariant violated");
                self.violations.push(violation);

                if self.violations.len() >= self.max_violations {
                    return Err(SimulationError::TooManyInvariantViolations {
                        count: self.violations.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SequenceSource;
    use contention_core::{ChannelEvent, SteadyStateSolver, StateModel, UserPriority};

    fn analysis(class: UserPriority) -> ClassAnalysis {
        ClassAnalysis::analyze(&class.config().unwrap(), 2, SteadyStateSolver::default()).unwrap()
    }

    struct AlwaysViolated;

    impl Invariant for AlwaysViolated {
        fn check(
            &self,
            session: &SimulationSession,
            _model: &StateModel,
        ) -> Result<(), InvariantViolation> {
            Err(self.violation(session, "never holds".to_string()))
        }

        fn name(&self) -> &str {
            "AlwaysViolated"
        }
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = SimulationConfig::deterministic_testing();
        let mut first = ChainDriver::new(analysis(UserPriority::Up0), &config).unwrap();
        let mut second = ChainDriver::new(analysis(UserPriority::Up0), &config).unwrap();

        let a = first.run(500).unwrap();
        let b = second.run(500).unwrap();

        assert_eq!(a.seed, Some(42));
        assert_eq!(a.event_counts, b.event_counts);
        assert_eq!(a.final_state, b.final_state);
        assert_eq!(first.session().snapshot(), second.session().snapshot());
    }

    #[test]
    fn test_scripted_walk() {
        let source = SequenceSource::new(vec![0.12, 0.12, 0.5, 0.01]).unwrap();
        let mut driver = ChainDriver::with_source(
            analysis(UserPriority::Up0),
            source,
            &SimulationConfig::default(),
        )
        .unwrap();

        let mut events = Vec::new();
        let report = driver.run_with(4, |outcome| events.push(outcome.event)).unwrap();

        assert_eq!(
            events,
            vec![
                ChannelEvent::Collision,
                ChannelEvent::Collision,
                ChannelEvent::Idle,
                ChannelEvent::Success
            ]
        );
        assert_eq!(report.seed, None);
        assert_eq!(report.steps, 4);
        assert_eq!(report.final_state, 0);
        assert_eq!(report.empirical_tau, 0.75);
        assert!(report.success);
        let visits: Vec<u64> = report.occupancy.iter().map(|state| state.visits).collect();
        assert_eq!(visits, vec![1, 1, 2]);
    }

    #[test]
    fn test_switch_class_resets_session() {
        let mut driver = ChainDriver::new(
            analysis(UserPriority::Up0),
            &SimulationConfig::deterministic_testing(),
        )
        .unwrap();
        driver.run(50).unwrap();

        driver.switch_class(analysis(UserPriority::Up2));
        assert_eq!(driver.session().step_count(), 0);
        assert_eq!(driver.session().current_state_index(), 0);
        assert_eq!(driver.analysis().model().len(), 5);
        assert_eq!(driver.report().occupancy.len(), 5);
    }

    #[test]
    fn test_violation_cap_stops_run() {
        let config = SimulationConfig {
            max_recorded_violations: 3,
            ..SimulationConfig::deterministic_testing()
        };
        let mut driver = ChainDriver::new(analysis(UserPriority::Up0), &config).unwrap();
        driver.add_invariant(Box::new(AlwaysViolated));

        let err = driver.run(10).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::TooManyInvariantViolations { count: 3 }
        ));
        assert_eq!(driver.session().step_count(), 3);
        assert!(!driver.report().success);
        assert!(driver.report().summary().contains("AlwaysViolated"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SimulationConfig {
            history_capacity: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            ChainDriver::new(analysis(UserPriority::Up0), &config),
            Err(SimulationError::Chain(ChainError::InvalidInput { .. }))
        ));
    }

    #[test]
    fn test_empty_run_report() {
        let driver = ChainDriver::new(
            analysis(UserPriority::Up5),
            &SimulationConfig::deterministic_testing(),
        )
        .unwrap();
        let report = driver.report();
        assert_eq!(report.steps, 0);
        assert_eq!(report.empirical_tau, 0.0);
        assert!(report.summary().contains("seed: 42"));
    }
}
