//! JSON-lines log files
//!
//! File-backed [`ProcessedLog`](outbox_relay_domain::processing::ProcessedLog)
//! and [`ErrorSink`](outbox_relay_domain::processing::ErrorSink). One JSON
//! object per line, appended and synced before the call returns.

pub mod errors;
pub mod processed;

pub use errors::FileErrorSink;
pub use processed::FileProcessedLog;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default processed log location
pub const DEFAULT_PROCESSED_LOG: &str = "outbox-processed.log";
/// Default error log location
pub const DEFAULT_ERROR_LOG: &str = "outbox-errors.log";

/// Log file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_processed_path")]
    pub processed_path: PathBuf,
    #[serde(default = "default_error_path")]
    pub error_path: PathBuf,
}

fn default_processed_path() -> PathBuf {
    PathBuf::from(DEFAULT_PROCESSED_LOG)
}

fn default_error_path() -> PathBuf {
    PathBuf::from(DEFAULT_ERROR_LOG)
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            processed_path: default_processed_path(),
            error_path: default_error_path(),
        }
    }
}

/// Open a log file for appending, creating it and its parent directory.
pub(crate) async fn open_append(path: &std::path::Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}
