//! Logging configuration for ragrun

use std::path::Path;

use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{
    self,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::Result;

const LOGS_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "ragrun.log";

/// Initialize logging system with file output
///
/// Keep the returned guard alive until exit; dropping it flushes the log file.
pub fn init_logging() -> Result<WorkerGuard> {
    init_logging_with_config(None)
}

/// Initialize logging with configuration
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_logging_with_config(config: Option<&crate::config::AppConfig>) -> Result<WorkerGuard> {
    let level = config.map_or("info", |c| c.logging.level.as_str());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},ragrun={level}")));
    let guard = install(env_filter)?;

    tracing::info!("Logging initialized with level: {} - console and file output enabled", level);
    tracing::info!("Log files will be saved to: {}/{}.YYYY-MM-DD", LOGS_DIR, LOG_FILE_PREFIX);
    Ok(guard)
}

/// Initialize logging with custom log level
pub fn init_logging_with_level(level: &str) -> Result<WorkerGuard> {
    let guard = install(EnvFilter::new(format!("{level},ragrun={level}")))?;
    tracing::info!("Logging initialized with level: {}", level);
    Ok(guard)
}

/// Daily rolling file writer under `dir`, flushed when the guard drops
fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(file_appender))
}

fn install(env_filter: EnvFilter) -> Result<WorkerGuard> {
    let (non_blocking, guard) = file_writer(Path::new(LOGS_DIR))?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false); // No colors in file

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::RagRunError::Custom(format!("Failed to install logger: {e}")))?;

    Ok(guard)
}

/// Initialize simple logging for tests and one-shot commands
pub fn init_simple_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| crate::RagRunError::Custom(format!("Failed to install logger: {e}")))?;

    tracing::info!("Simple logging initialized");
    Ok(())
}
