use std::path::Path;
use std::time::Instant;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{LifecycleError, Result};

const DEFAULT_LOG_FILE: &str = "event-inbox.log";

/// Initialize structured logging system.
///
/// `RUST_LOG` overrides `log_level`. Console output goes to stderr as text or JSON
/// depending on `format`; with `log_file` set, a daily-rolling JSON file is written
/// as well. Keep the returned guard alive for as long as file logging is needed.
pub fn init_logging(
    log_level: &str,
    format: &str,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    // Set up environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| LifecycleError::InvalidConfig(format!("Failed to create log filter: {e}")))?;

    // File layer sits directly on the filtered registry so both console variants share its type
    let (file_layer, guard) = match log_file {
        Some(log_path) => {
            let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = log_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(DEFAULT_LOG_FILE);
            let (writer, guard) = non_blocking(rolling::daily(directory, file_name));

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = Registry::default().with(env_filter).with(file_layer);

    let initialized = if format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    };
    initialized.map_err(|e| LifecycleError::Other(format!("Logging already initialized: {e}")))?;

    info!(level = log_level, format, "Logging system initialized");
    Ok(guard)
}

/// Logs how long an operation took
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
    finished: bool,
}

impl OperationTimer {
    /// Start timing `operation`
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
            finished: false,
        }
    }

    /// Log the elapsed time at info level and return it in milliseconds
    pub fn finish(mut self) -> u128 {
        self.finished = true;
        let duration = self.start.elapsed().as_millis();
        info!(operation = self.operation, duration_ms = duration, "Operation completed");
        duration
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !self.finished && !std::thread::panicking() {
            tracing::debug!(
                operation = self.operation,
                duration_ms = self.start.elapsed().as_millis(),
                "Operation abandoned"
            );
        }
    }
}
