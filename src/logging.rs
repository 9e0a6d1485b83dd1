//! # Logging Setup
//!
//! `tracing` subscriber shared by all three binaries.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. When `dir` is set,
/// output goes to a daily-rolling `<file_prefix>.log` in that directory and the
/// returned guard must be held until exit so buffered lines are flushed.
pub fn init(config: &LoggingConfig, file_prefix: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", file_prefix));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
