//! CLI command implementations

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use contention_core::config::ContentionConfig;
use contention_core::{
    ClassAnalysis, PerformanceMetrics, SolverMethod, SteadyStateSolver, UserPriority,
};
use contention_sim::{ChainDriver, StepOutcome};
use serde::Serialize;
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List the reference priority classes
    Classes {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Solve the chain of one class
    Analyze {
        /// Priority class (defaults to CONTENTION_DEFAULT_CLASS or up0)
        #[arg(short, long, value_enum)]
        class: Option<UserPriority>,
        /// Contending devices, the tagged one included
        #[arg(short, long)]
        devices: Option<u32>,
        /// Steady-state algorithm
        #[arg(long, value_enum)]
        solver: Option<SolverMethod>,
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Step through the chain of one class
    Simulate {
        /// Priority class (defaults to CONTENTION_DEFAULT_CLASS or up0)
        #[arg(short, long, value_enum)]
        class: Option<UserPriority>,
        /// Number of slots to simulate
        #[arg(short, long, default_value = "20")]
        steps: u64,
        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
        /// Contending devices, the tagged one included
        #[arg(short, long)]
        devices: Option<u32>,
        /// Pause between steps in milliseconds
        #[arg(long, default_value = "0")]
        interval_ms: u64,
        /// Print the report as JSON instead of every transition
        #[arg(long)]
        json: bool,
    },
    /// Compare every reference class side by side
    Compare {
        /// Contending devices, the tagged one included
        #[arg(short, long)]
        devices: Option<u32>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the engine error of the command that fails
pub fn handle_command(command: Commands, config: &ContentionConfig) -> Result<()> {
    match command {
        Commands::Classes { json } => list_classes(json),
        Commands::Analyze {
            class,
            devices,
            solver,
            json,
        } => analyze_class(
            class.unwrap_or(config.model.default_class),
            devices.unwrap_or(config.model.device_count),
            solver.map_or_else(|| config.solver.solver(), SteadyStateSolver::new),
            json,
        ),
        Commands::Simulate {
            class,
            steps,
            seed,
            devices,
            interval_ms,
            json,
        } => {
            let mut simulation = config.simulation.clone();
            if seed.is_some() {
                simulation.deterministic_seed = seed;
            }
            let analysis = ClassAnalysis::analyze(
                &class.unwrap_or(config.model.default_class).config()?,
                devices.unwrap_or(config.model.device_count),
                config.solver.solver(),
            )?;
            let driver = ChainDriver::new(analysis, &simulation)?;
            run_simulation(driver, steps, Duration::from_millis(interval_ms), json)
        }
        Commands::Compare { devices, json } => {
            compare_classes(devices.unwrap_or(config.model.device_count), config, json)
        }
    }
}

#[derive(Serialize)]
struct ClassRow {
    class: String,
    label: &'static str,
    max_contention_probability: f64,
    min_contention_probability: f64,
    backoff_states: usize,
}

/// List the reference classes
///
/// # Errors
/// - `ChainError::InvalidConfig` - A reference class failed validation
pub fn list_classes(json: bool) -> Result<()> {
    let rows = UserPriority::ALL
        .iter()
        .map(|class| -> Result<ClassRow> {
            let config = class.config()?;
            Ok(ClassRow {
                class: class.to_string(),
                label: class.label(),
                max_contention_probability: config.max_contention_probability(),
                min_contention_probability: config.min_contention_probability(),
                backoff_states: config.backoff_state_count(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<6} {:<28} {:>8} {:>8} {:>7}", "Class", "Traffic", "CPmax", "CPmin", "States");
    println!("{:-<61}", "");
    for row in &rows {
        println!(
            "{:<6} {:<28} {:>8.5} {:>8.5} {:>7}",
            row.class,
            row.label,
            row.max_contention_probability,
            row.min_contention_probability,
            row.backoff_states + 1
        );
    }

    Ok(())
}

/// Solve and print one class
///
/// # Errors
/// - `ChainError::InvalidInput` - `devices` is zero
/// - `ChainError::SingularChain` - The chain has no steady state
pub fn analyze_class(
    class: UserPriority,
    devices: u32,
    solver: SteadyStateSolver,
    json: bool,
) -> Result<()> {
    let analysis = ClassAnalysis::analyze(&class.config()?, devices, solver)
        .with_context(|| format!("analyzing {class} with {devices} devices"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!("{class} ({}), {devices} devices, {} solver", class.label(), solver.method());
    println!();
    println!(
        "{:>5} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "State", "CP", "Success", "Collision", "Idle", "Steady"
    );
    println!("{:-<60}", "");
    for snapshot in analysis.model().snapshots() {
        println!(
            "{:>5} {:>10.6} {:>10.6} {:>10.6} {:>10.6} {:>10.6}{}",
            snapshot.index,
            snapshot.contention_probability,
            snapshot.success,
            snapshot.collision,
            snapshot.idle,
            analysis.steady_state().probability(snapshot.index),
            if snapshot.is_last { "  (ceiling)" } else { "" }
        );
    }

    println!();
    print_metrics(&analysis.metrics());
    println!("  residual |πP - π|: {:.3e}", analysis.residual());
    println!(
        "  contraction:       {:.6}",
        analysis.matrix().contraction_coefficient()
    );

    Ok(())
}

fn print_metrics(metrics: &PerformanceMetrics) {
    println!("  transmission τ:    {:.6}", metrics.tau);
    println!("  collision γ:       {:.6}", metrics.gamma);
    println!("  throughput η:      {:.6}", metrics.eta);
}

/// Run a driver and print its transitions and report
///
/// # Errors
/// - `SimulationError::TooManyInvariantViolations` - The run stopped early
pub fn run_simulation(
    mut driver: ChainDriver,
    steps: u64,
    interval: Duration,
    json: bool,
) -> Result<()> {
    info!(seed = ?driver.seed(), steps, "Starting simulation");

    let report = driver.run_with(steps, |outcome: &StepOutcome| {
        if !json {
            let record = outcome.record;
            println!(
                "step {:>6}: state {} -> {} ({})",
                record.step, record.from, record.to, record.event
            );
        }
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print!("{}", report.summary());
    }

    Ok(())
}

#[derive(Serialize)]
struct ComparisonRow {
    class: String,
    max_contention_probability: f64,
    metrics: PerformanceMetrics,
}

/// Print τ, γ and η of every reference class
///
/// # Errors
/// - `ChainError::InvalidInput` - `devices` is zero
/// - `ChainError::SingularChain` - A class has no steady state
pub fn compare_classes(devices: u32, config: &ContentionConfig, json: bool) -> Result<()> {
    let rows = UserPriority::ALL
        .iter()
        .map(|class| -> Result<ComparisonRow> {
            let class_config = class.config()?;
            let analysis = ClassAnalysis::analyze(&class_config, devices, config.solver.solver())
                .with_context(|| format!("analyzing {class}"))?;
            Ok(ComparisonRow {
                class: class.to_string(),
                max_contention_probability: class_config.max_contention_probability(),
                metrics: analysis.metrics(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{devices} contending devices");
    println!("{:<6} {:>8} {:>10} {:>10} {:>10}", "Class", "CPmax", "τ", "γ", "η");
    println!("{:-<48}", "");
    for row in &rows {
        println!(
            "{:<6} {:>8.5} {:>10.6} {:>10.6} {:>10.6}",
            row.class,
            row.max_contention_probability,
            row.metrics.tau,
            row.metrics.gamma,
            row.metrics.eta
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use contention_core::config::SimulationConfig;
    use contention_sim::SequenceSource;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_parse_analyze_arguments() {
        let cli = TestCli::try_parse_from([
            "contention", "analyze", "--class", "up5", "--devices", "4", "--solver", "linear",
        ])
        .unwrap();

        match cli.command {
            Commands::Analyze {
                class,
                devices,
                solver,
                json,
            } => {
                assert_eq!(class, Some(UserPriority::Up5));
                assert_eq!(devices, Some(4));
                assert_eq!(solver, Some(SolverMethod::Linear));
                assert!(!json);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_unknown_class_rejected_by_parser() {
        assert!(TestCli::try_parse_from(["contention", "simulate", "--class", "up7"]).is_err());
    }

    #[test]
    fn test_commands_succeed_with_defaults() {
        let config = ContentionConfig::for_testing();
        handle_command(Commands::Classes { json: true }, &config).unwrap();
        handle_command(
            Commands::Compare {
                devices: None,
                json: false,
            },
            &config,
        )
        .unwrap();
        handle_command(
            Commands::Simulate {
                class: Some(UserPriority::Up3),
                steps: 5,
                seed: Some(7),
                devices: None,
                interval_ms: 0,
                json: true,
            },
            &config,
        )
        .unwrap();
    }

    #[test]
    fn test_zero_devices_surfaces_chain_error() {
        let config = ContentionConfig::for_testing();
        let err = handle_command(
            Commands::Analyze {
                class: None,
                devices: Some(0),
                solver: None,
                json: false,
            },
            &config,
        )
        .unwrap_err();

        assert!(err.downcast_ref::<contention_core::ChainError>().is_some());
    }

    #[test]
    fn test_run_simulation_with_scripted_draws() {
        let analysis = ClassAnalysis::analyze(
            &UserPriority::Up0.config().unwrap(),
            2,
            SteadyStateSolver::default(),
        )
        .unwrap();
        let source = SequenceSource::new(vec![0.12, 0.5]).unwrap();
        let driver =
            ChainDriver::with_source(analysis, source, &SimulationConfig::default()).unwrap();

        run_simulation(driver, 4, Duration::ZERO, false).unwrap();
    }
}
