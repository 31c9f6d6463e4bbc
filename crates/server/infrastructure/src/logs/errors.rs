//! File-backed error sink

use async_trait::async_trait;
use outbox_relay_domain::processing::{ErrorLogEntry, ErrorSink};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, warn};

use super::open_append;

/// Append-only JSON-lines error log
pub struct FileErrorSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileErrorSink {
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path).await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_entry(&self, entry: &ErrorLogEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(entry).map_err(std::io::Error::other)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.sync_data().await
    }
}

#[async_trait]
impl ErrorSink for FileErrorSink {
    async fn record(&self, context: &str, err: &(dyn std::error::Error + Send + Sync + 'static)) {
        let entry = ErrorLogEntry::new(context, err);
        warn!(context = %entry.context, error = %entry.error, "Processing error recorded");

        if let Err(e) = self.write_entry(&entry).await {
            error!(
                path = %self.path.display(),
                context = %entry.context,
                error = %e,
                "Failed to write error log entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outbox update failure")]
    struct Wrapped(#[source] std::io::Error);

    #[tokio::test]
    async fn test_record_appends_entry_with_stack() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        let sink = FileErrorSink::open(&path).await.unwrap();

        let err = Wrapped(std::io::Error::other("connection reset"));
        sink.record("Error processing message 4", &err).await;
        sink.record("Replication service error", &std::io::Error::other("boom"))
            .await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["context"], "Error processing message 4");
        assert_eq!(lines[0]["error"], "outbox update failure");
        assert_eq!(lines[0]["stack"], "connection reset");
        assert!(lines[1]["stack"].is_null());
        assert_eq!(sink.path(), path.as_path());
    }
}
