//! Change capture source port

use super::cursor::{Cursor, CursorError};
use super::position::Position;
use super::record::ChangeBatch;

/// Errors raised by a capture source
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Network or store hiccup while fetching; the session retries with backoff
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// The stream or replication connection itself failed; not retried
    #[error("Fatal stream error: {0}")]
    Fatal(String),

    /// Startup could not prepare the source (slot, publication, stream lookup)
    #[error("Capture setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl CaptureError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Transient(_))
    }
}

/// Producer of ordered change records
///
/// Driven by a single capture session: `start`, then repeated
/// `fetch` / `acknowledge`, then `close`. Records must be returned in the
/// order the source observed them.
#[async_trait::async_trait]
pub trait ChangeCaptureSource: Send {
    /// Short name used in logs and metrics
    fn kind(&self) -> &'static str;

    /// Prepare the source and anchor the cursor.
    async fn start(&mut self) -> Result<(), CaptureError>;

    /// Fetch the next batch. An empty batch means nothing new yet.
    async fn fetch(&mut self) -> Result<ChangeBatch, CaptureError>;

    /// Confirm that everything up to `position` has been delivered.
    ///
    /// Called once per record after the processor finished with it, and once
    /// per batch with [`ChangeBatch::resume_from`].
    async fn acknowledge(&mut self, position: &Position) -> Result<(), CaptureError>;

    /// Flush outstanding acknowledgments and release handles.
    async fn close(&mut self) -> Result<(), CaptureError>;

    fn cursor(&self) -> &Cursor;
}
