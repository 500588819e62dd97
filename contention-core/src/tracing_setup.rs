//! Tracing setup for the contention tools
//!
//! Console output follows the level the user asked for; a second layer keeps
//! a full trace of the last run on disk, including every simulated step.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log inside the logs directory.
pub const LAST_RUN_LOG: &str = "contention-last-run.log";

/// Installs the global subscriber with a console layer and a trace file layer.
///
/// `RUST_LOG` overrides `console_level` for the console layer only. The file
/// at `<logs_dir>/contention-last-run.log` (default `./logs`) is truncated on
/// every call and always records at TRACE level. Returns the log file path.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - Logs directory or file cannot be created,
///   or a global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LAST_RUN_LOG);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false) // No color codes in files
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(
        console = %console_level,
        trace_file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// Console verbosity chosen with `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Failed commands only
    Error,
    /// Loose fixed points and invariant violations
    Warn,
    /// Simulation run summaries
    Info,
    /// Model construction and solver results
    Debug,
    /// Every simulated step
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_cli_names_map_to_levels() {
        let parsed = CliLogLevel::from_str("trace", true).unwrap();
        assert_eq!(Level::from(parsed), Level::TRACE);
        assert_eq!(Level::from(CliLogLevel::Warn), Level::WARN);
        assert!(CliLogLevel::from_str("loud", true).is_err());
    }
}
