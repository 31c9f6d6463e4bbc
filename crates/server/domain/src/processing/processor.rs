//! Message Processor
//!
//! Applies a captured outbox insert: appends it to the processed log and marks
//! the originating outbox row processed.
//!
//! The two effects are not atomic with each other. The processed log is the
//! source of truth; a record seen again after a crash between the append and
//! the status update only re-applies the (idempotent) status update, so
//! at-least-once delivery never produces duplicate log entries.

use std::sync::Arc;
use tracing::{debug, trace};

use super::model::ProcessedLogEntry;
use super::ports::{ProcessedLog, ProcessedLogError};
use crate::capture::{ChangeOperation, ChangeRecord, DecodeError};
use crate::outbox::{OutboxError, OutboxStore, OUTBOX_TABLE};

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] DecodeError),

    #[error("Envelope timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("Processed log failure: {0}")]
    ProcessedLog(#[from] ProcessedLogError),

    #[error("Outbox update failure: {0}")]
    Outbox(#[from] OutboxError),
}

/// What processing did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new processed-log entry was appended
    Recorded { message_id: i32 },
    /// The message was already in the processed log
    Duplicate { message_id: i32 },
    /// Not an insert on the outbox table
    Skipped,
}

pub struct MessageProcessor {
    store: Arc<dyn OutboxStore>,
    log: Arc<dyn ProcessedLog>,
    outbox_table: String,
}

impl MessageProcessor {
    pub fn new(store: Arc<dyn OutboxStore>, log: Arc<dyn ProcessedLog>) -> Self {
        Self {
            store,
            log,
            outbox_table: OUTBOX_TABLE.to_string(),
        }
    }

    /// Use a different table name for outbox rows.
    pub fn with_outbox_table(mut self, table: impl Into<String>) -> Self {
        self.outbox_table = table.into();
        self
    }

    pub async fn process(&self, record: &ChangeRecord) -> Result<ProcessOutcome, ProcessingError> {
        if record.operation != ChangeOperation::Insert || record.table_name != self.outbox_table {
            trace!(
                position = %record.position,
                operation = %record.operation,
                table = %record.table_name,
                "Skipping non-outbox change"
            );
            return Ok(ProcessOutcome::Skipped);
        }

        let (message_id, envelope) = record.decode()?;

        if self.log.contains(message_id).await? {
            self.store.mark_processed(message_id).await?;
            debug!(message_id, "Message already in processed log");
            return Ok(ProcessOutcome::Duplicate { message_id });
        }

        let timestamp = envelope.timestamp;
        let entry = ProcessedLogEntry::from_envelope(message_id, envelope)
            .ok_or(ProcessingError::InvalidTimestamp(timestamp))?;

        self.log.append(&entry).await?;
        self.store.mark_processed(message_id).await?;

        debug!(
            message_id,
            event_type = %entry.event_type,
            table = %entry.table_name,
            "Message processed"
        );
        Ok(ProcessOutcome::Recorded { message_id })
    }
}
