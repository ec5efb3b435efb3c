//! Logging setup for the command line client.
//!
//! Console output goes to stderr so `status` output on stdout stays clean.
//! With `logging.file_logging` enabled, events are also written to a daily
//! rolling `bitbucket-lock.log` in `logging.dir` (default `~/bitbucket-lock/logs`).

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::settings::LoggingSettings;

const LOG_FILE_NAME: &str = "bitbucket-lock.log";

/// Guard that keeps the file writer alive; dropping it flushes buffered output.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn log_dir(settings: &LoggingSettings) -> PathBuf {
    settings.dir.as_ref().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(format!("{}/bitbucket-lock/logs", home))
    })
}

/// `RUST_LOG` takes precedence over the configured level
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber.
pub fn init_logging(
    settings: &LoggingSettings,
) -> Result<LoggingGuard, Box<dyn std::error::Error + Send + Sync>> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(level_filter(&settings.level));
    layers.push(Box::new(console_layer));

    let mut file_guard = None;
    let dir = log_dir(settings);
    if settings.file_logging {
        std::fs::create_dir_all(&dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(level_filter(&settings.level));
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if settings.file_logging {
        tracing::debug!(log_dir = %dir.display(), "File logging initialized");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
