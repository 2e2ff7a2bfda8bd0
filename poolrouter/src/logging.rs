//! Logging setup for the request container.
//!
//! Events go to two sinks:
//! - the log file from `[logging]` (truncated when the process starts)
//! - stdout, for operators tailing the service
//!
//! The level filter comes from `RUST_LOG` and defaults to `info`. Request
//! actors log with a `request` field holding the canonical request name, so
//! `RUST_LOG=poolrouter::container=debug` plus a grep on the name follows a
//! single request through its state machine.

use crate::config::LoggingSettings;
use std::fs;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the non-blocking file writer alive; dropping it flushes the file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Creates the log directory if needed and empties the log file.
fn prepare_log_file(settings: &LoggingSettings) -> Result<(), io::Error> {
    fs::create_dir_all(&settings.directory)?;
    fs::write(settings.directory.join(&settings.file), "")
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the log file
/// cannot be truncated.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard, io::Error> {
    prepare_log_file(settings)?;

    let file_appender = tracing_appender::rolling::never(&settings.directory, &settings.file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
