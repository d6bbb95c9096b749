use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_ENV: &str = "GHOSTTYPE_LOG";

/// `GHOSTTYPE_LOG`, then `RUST_LOG`, then `default_level`
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn log_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("ghosttype"))
}

/// The TUI owns the terminal, so logs go to `<cache dir>/ghosttype/ghosttype.log`.
/// Keep the guard alive until exit or buffered lines are lost.
pub fn init_file_logging() -> Result<Option<WorkerGuard>> {
    let Some(dir) = log_dir() else {
        return Ok(None);
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&dir, "ghosttype.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(non_blocking)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    Ok(Some(guard))
}

/// One-shot subcommands log warnings and up to stderr, keeping stdout for output
pub fn init_stderr_logging() {
    let _ = fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
