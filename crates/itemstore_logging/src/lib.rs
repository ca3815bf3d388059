//! Shared logging utilities for itemstore binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "itemstore=info,itemstore_db=info";
const HOME_ENV: &str = "ITEMSTORE_HOME";

/// Logging configuration shared by itemstore binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a daily rolling file writer and stderr output.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_appender =
        tracing_appender::rolling::daily(&log_dir, format!("{}.log", sanitize_name(config.app_name)));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new("itemstore=debug,itemstore_db=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Get the itemstore home directory: `$ITEMSTORE_HOME` or ~/.itemstore
pub fn itemstore_home() -> PathBuf {
    resolve_home(std::env::var(HOME_ENV).ok(), dirs::home_dir())
}

fn resolve_home(override_path: Option<String>, home: Option<PathBuf>) -> PathBuf {
    match override_path.filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => home.unwrap_or_else(|| PathBuf::from(".")).join(".itemstore"),
    }
}

/// Get the logs directory: ~/.itemstore/logs
pub fn logs_dir() -> PathBuf {
    itemstore_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
