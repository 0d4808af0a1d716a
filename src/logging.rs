use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// Logging Setup
// =============================================================================

/// Log to stdout, and to a daily rotated file when `log_dir` is set. The
/// returned guard must be held until exit so buffered file lines are flushed.
pub fn setup_logging(log_dir: Option<&Path>, log_level: &str) -> Result<Option<WorkerGuard>> {
    let stdout_layer = fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "plex-updater.log");
            let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::Layer::new()
                .with_writer(non_blocking_appender)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false);

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let filter = EnvFilter::try_new(format!("plex_updater={log_level}"))
        .with_context(|| format!("Invalid log level: {log_level}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
