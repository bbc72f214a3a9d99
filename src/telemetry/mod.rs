//! Logging infrastructure.

pub mod logging;

pub use logging::{init_logging, LogConfig};

// Re-export so callers can hold the file writer guard.
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;
