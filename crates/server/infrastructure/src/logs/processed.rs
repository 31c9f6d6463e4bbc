//! File-backed processed log

use async_trait::async_trait;
use outbox_relay_domain::processing::{ProcessedLog, ProcessedLogEntry, ProcessedLogError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::open_append;

struct State {
    file: File,
    ids: HashSet<i32>,
    /// The file ends in a partial line; the next append starts a new one
    torn: bool,
}

/// Append-only JSON-lines processed log
///
/// The set of logged message ids is loaded when the file is opened and kept in
/// memory, so `contains` never touches the disk.
pub struct FileProcessedLog {
    path: PathBuf,
    state: Mutex<State>,
}

impl FileProcessedLog {
    /// Open (or create) the log at `path` and index the ids already in it.
    ///
    /// Lines that do not parse are skipped with a warning.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProcessedLogError> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path).await?;
        let torn = ends_mid_line(&path).await?;

        let ids: HashSet<i32> = read_entries(&path)
            .await?
            .into_iter()
            .map(|entry| entry.message_id)
            .collect();

        info!(path = %path.display(), entries = ids.len(), "Processed log opened");

        Ok(Self {
            path,
            state: Mutex::new(State { file, ids, torn }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn ends_mid_line(path: &Path) -> Result<bool, ProcessedLogError> {
    let content = tokio::fs::read(path).await?;
    Ok(content.last().is_some_and(|byte| *byte != b'\n'))
}

async fn read_entries(path: &Path) -> Result<Vec<ProcessedLogEntry>, ProcessedLogError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ProcessedLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping unreadable processed log line"
            ),
        }
    }
    Ok(entries)
}

#[async_trait]
impl ProcessedLog for FileProcessedLog {
    async fn append(&self, entry: &ProcessedLogEntry) -> Result<(), ProcessedLogError> {
        let json = serde_json::to_vec(entry)?;

        let mut state = self.state.lock().await;
        let mut line = Vec::with_capacity(json.len() + 2);
        if state.torn {
            line.push(b'\n');
        }
        line.extend_from_slice(&json);
        line.push(b'\n');

        if let Err(e) = state.file.write_all(&line).await {
            state.torn = true;
            return Err(e.into());
        }
        state.torn = false;
        state.file.sync_data().await?;
        state.ids.insert(entry.message_id);
        Ok(())
    }

    async fn contains(&self, message_id: i32) -> Result<bool, ProcessedLogError> {
        Ok(self.state.lock().await.ids.contains(&message_id))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ProcessedLogEntry>, ProcessedLogError> {
        // Hold the lock so a concurrent append is either fully visible or absent.
        let _state = self.state.lock().await;
        let entries = read_entries(&self.path).await?;
        Ok(entries.into_iter().rev().take(limit).collect())
    }
}
