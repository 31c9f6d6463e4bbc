//! Processed log and error sink ports

use super::model::ProcessedLogEntry;

#[derive(Debug, thiserror::Error)]
pub enum ProcessedLogError {
    #[error("Processed log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Processed log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable, append-only log of processed events
#[async_trait::async_trait]
pub trait ProcessedLog: Send + Sync {
    /// Append an entry; returns once the entry is durable.
    async fn append(&self, entry: &ProcessedLogEntry) -> Result<(), ProcessedLogError>;

    /// Whether an entry for `message_id` has already been appended.
    async fn contains(&self, message_id: i32) -> Result<bool, ProcessedLogError>;

    /// The most recent entries, newest first, at most `limit`.
    async fn recent(&self, limit: usize) -> Result<Vec<ProcessedLogEntry>, ProcessedLogError>;
}

/// Durable structured log for recoverable processing failures
///
/// Recording never fails from the caller's point of view.
#[async_trait::async_trait]
pub trait ErrorSink: Send + Sync {
    async fn record(&self, context: &str, error: &(dyn std::error::Error + Send + Sync + 'static));
}
