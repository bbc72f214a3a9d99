//! Logging configuration and initialization
//!
//! Structured logging with tracing: compact console output, optional JSON
//! lines, and an optional plain-text log file.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::config::EvalConfig;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    pub file_enabled: bool,
    /// Path for the log file (default: `flow_eval.log`)
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Logging settings carried by a run configuration.
    pub fn from_eval_config(config: &EvalConfig) -> Self {
        Self {
            console_enabled: true,
            file_enabled: config.log_file.is_some(),
            file_path: config.log_file.clone(),
            json_format: config.log_json,
            default_level: config.log_level.clone(),
        }
    }
}

/// Initialize the global subscriber.
///
/// Returns a guard that must be kept alive for the duration of the program
/// so the file writer is flushed.
///
/// # Environment Variables
///
/// - `FLOW_EVAL_LOG`: log filter (e.g. "debug", "info,flow_eval::runner=debug"),
///   falling back to `RUST_LOG`
/// - `FLOW_EVAL_LOG_FORMAT`: set to "json" for JSON output
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env("FLOW_EVAL_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let use_json = std::env::var("FLOW_EVAL_LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(config.json_format);

    let mut file_guard: Option<WorkerGuard> = None;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.file_enabled {
        let log_path = config
            .file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("flow_eval.log"));
        let file = std::fs::File::create(&log_path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        if config.console_enabled {
            let console_layer = fmt::layer().with_target(false).compact();
            subscriber.with(file_layer).with(console_layer).try_init()?;
        } else {
            subscriber.with(file_layer).try_init()?;
        }

        eprintln!("Logging to file: {}", log_path.display());
    } else if config.console_enabled {
        if use_json {
            let json_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            subscriber.with(json_layer).try_init()?;
        } else {
            let console_layer = fmt::layer().with_target(false).compact();
            subscriber.with(console_layer).try_init()?;
        }
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}
