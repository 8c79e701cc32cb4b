//! Logging setup with a reloadable filter.
//!
//! This module provides:
//! - Console output (text or JSON) with local timezone timestamps
//! - Optional daily-rotated log files
//! - Runtime log level changes via `tracing_subscriber::reload`
//! - Log file retention cleanup

use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "herald=info";

/// Prefix of rotated log file names.
const LOG_FILE_PREFIX: &str = "herald.log";

/// Log retention period in days.
pub const LOG_RETENTION_DAYS: i64 = 7;

/// Logging options, usually read from the `logging` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Filter directive, e.g. `herald=debug`.
    pub filter: String,
    /// Emit JSON lines on the console instead of text.
    pub json: bool,
    /// Directory for daily-rotated log files; console only when unset.
    pub directory: Option<PathBuf>,
    /// Days rotated files are kept.
    pub retention_days: i64,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
            directory: None,
            retention_days: LOG_RETENTION_DAYS,
        }
    }
}

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Handle to the installed subscriber.
///
/// Keep it alive for the lifetime of the process: it owns the file
/// writer's guard.
pub struct LoggingHandle {
    handle: FilterHandle,
    _guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    /// Get the current filter directive string.
    pub fn filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive.
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = parse_filter(directive)?;
        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

/// Validate a filter directive without installing it.
pub fn parse_filter(directive: &str) -> crate::Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| crate::Error::config(format!("Invalid filter directive: {}", e)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_logging(options: &LoggingOptions) -> crate::Result<LoggingHandle> {
    let initial_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&options.filter)?,
    };
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    let (file_layer, guard) = match &options.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let text_layer = (!options.json).then(|| fmt::layer().with_ansi(true).with_timer(LocalTimer));
    let json_layer = options
        .json
        .then(|| fmt::layer().json().with_timer(LocalTimer));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(LoggingHandle {
        handle: filter_handle,
        _guard: guard,
    })
}

/// Apply the configured retention to the log directory, if there is one.
///
/// Failures are logged, not returned.
pub async fn prune_logs(options: &LoggingOptions) -> usize {
    let Some(dir) = &options.directory else {
        return 0;
    };
    match cleanup_old_logs(dir, options.retention_days).await {
        Ok(deleted) => deleted,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to cleanup old logs");
            0
        }
    }
}

/// Delete rotated log files older than the retention period.
///
/// Returns the number of deleted files.
pub async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let date_str = match path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(LOG_FILE_PREFIX))
            .and_then(|n| n.strip_prefix('.'))
        {
            Some(date) => date,
            None => continue,
        };

        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}
