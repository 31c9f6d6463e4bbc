//! Processed and error log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outbox::EventEnvelope;

/// One line of the processed log
///
/// The processed log is append-only and authoritative for "was this event
/// delivered".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedLogEntry {
    /// When the relay processed the event
    pub timestamp: DateTime<Utc>,
    /// Outbox row id
    pub message_id: i32,
    pub event_type: String,
    pub table_name: String,
    pub data: serde_json::Value,
    /// When the event was written, from the envelope
    pub original_timestamp: DateTime<Utc>,
}

impl ProcessedLogEntry {
    /// Build an entry stamped with the current time.
    ///
    /// Returns `None` if the envelope timestamp is out of range.
    pub fn from_envelope(message_id: i32, envelope: EventEnvelope) -> Option<Self> {
        let original_timestamp = envelope.occurred_at()?;
        Some(Self {
            timestamp: Utc::now(),
            message_id,
            event_type: envelope.event_type,
            table_name: envelope.table_name,
            data: envelope.data,
            original_timestamp,
        })
    }
}

/// One line of the error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub error: String,
    /// The error's source chain, outermost cause first
    pub stack: Option<String>,
}

impl ErrorLogEntry {
    pub fn new(context: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            timestamp: Utc::now(),
            context: context.into(),
            error: error.to_string(),
            stack: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\ncaused by: "))
            },
        }
    }
}
