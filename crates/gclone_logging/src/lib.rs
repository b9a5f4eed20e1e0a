//! Shared logging setup for gclone binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "gclone=info,gclone_extract=info,gclone_sinks=info";

/// Environment variable overriding the gclone home directory.
pub const HOME_ENV: &str = "GCLONE_HOME";

/// Logging configuration shared by gclone binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Show debug output on the console.
    pub verbose: bool,
    /// Only errors on the console. Ignored when `verbose` is set.
    pub quiet: bool,
}

/// Keeps the background log writer alive. Drop it last to flush the file.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with a daily rolling file and stderr output.
///
/// The console never writes to stdout; stdout carries progress lines.
/// If the log directory cannot be created, logging continues on stderr only.
pub fn init_logging(config: LogConfig<'_>) -> LogGuard {
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = console_filter(config.verbose, config.quiet, &file_filter);

    let mut file_guard = None;
    let file_layer = match ensure_logs_dir() {
        Ok(log_dir) => {
            let file_appender =
                tracing_appender::rolling::daily(log_dir, format!("{}.log", config.app_name));
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            file_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        Err(err) => {
            eprintln!("Warning: failed to create logs directory: {:#}", err);
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .init();

    LogGuard { _file: file_guard }
}

fn console_filter(verbose: bool, quiet: bool, file_filter: &EnvFilter) -> EnvFilter {
    if verbose {
        EnvFilter::new("gclone=debug,gclone_extract=debug,gclone_sinks=debug")
    } else if quiet {
        EnvFilter::new("error")
    } else if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    }
}

/// Get the gclone home directory: `$GCLONE_HOME`, else `~/.gclone`.
pub fn gclone_home() -> PathBuf {
    if let Some(override_path) = std::env::var_os(HOME_ENV) {
        if !override_path.is_empty() {
            return PathBuf::from(override_path);
        }
    }
    match dirs::home_dir() {
        Some(home) => home.join(".gclone"),
        None => PathBuf::from(".gclone"),
    }
}

/// Get the logs directory: `<home>/logs`
pub fn logs_dir() -> PathBuf {
    gclone_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
