//! Contention CLI - Command-line interface
//!
//! Inspects the reference priority classes, solves their chains and runs
//! step-by-step simulations.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use contention_core::ChainError;
use contention_core::config::ContentionConfig;
use contention_core::tracing_setup::{CliLogLevel, init_tracing};
use contention_sim::SimulationError;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "contention")]
#[command(about = "Priority-class contention backoff chain analyzer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (the trace file always records everything)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Directory for the last-run trace file
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = init_tracing(cli.log_level.into(), cli.logs_dir.as_deref())
        .map_err(|err| anyhow::anyhow!(err))?;
    debug!(log_file = %log_file.display(), "Starting contention CLI");

    let config = ContentionConfig::from_env();
    if let Err(err) = commands::handle_command(cli.command, &config) {
        error!("{err:#}");
        eprintln!("Error: {}", user_message(&err));
        std::process::exit(1);
    }

    Ok(())
}

fn user_message(err: &anyhow::Error) -> String {
    if let Some(chain) = err.downcast_ref::<ChainError>() {
        return chain.user_message();
    }
    if let Some(simulation) = err.downcast_ref::<SimulationError>() {
        return simulation.user_message();
    }
    format!("{err:#}")
}
