//! Outbox Event Model
//!
//! Domain model for outbox events written by the transactional writer and
//! relayed by the change-capture pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::people::{Person, PEOPLE_TABLE};

/// Table that holds outbox rows
pub const OUTBOX_TABLE: &str = "outbox";

/// Page size used by the read API when listing outbox events
pub const DEFAULT_OUTBOX_PAGE: usize = 50;

/// Event type written for inserted entities
pub const INSERT_EVENT: &str = "INSERT";

/// Status of an outbox event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Event has been committed but not yet relayed
    Pending,
    /// Event has been appended to the processed log
    Processed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processed => "processed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "processed" => Ok(OutboxStatus::Processed),
            other => Err(OutboxError::InvalidStatus(other.to_string())),
        }
    }
}

/// Error types for outbox operations
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid outbox status: {0}")]
    InvalidStatus(String),

    #[error("Infrastructure error: {message}")]
    InfrastructureError { message: String },
}

/// The structured payload stored in `outbox.message`
///
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub table_name: String,
    pub data: serde_json::Value,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
}

impl EventEnvelope {
    /// Build an envelope for an inserted row, stamped with the current time.
    pub fn insert(table_name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: INSERT_EVENT.to_string(),
            table_name: table_name.into(),
            data,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Envelope for a freshly inserted person row.
    pub fn for_person_insert(person: &Person) -> Result<Self, serde_json::Error> {
        Ok(Self::insert(PEOPLE_TABLE, serde_json::to_value(person)?))
    }

    /// The envelope timestamp as a UTC instant, if it is in range.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// A view of an outbox row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: i32,
    /// Raw `message` column; normally an [`EventEnvelope`]
    pub message: serde_json::Value,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, OutboxStatus::Pending)
    }

    pub fn is_processed(&self) -> bool {
        matches!(self.status, OutboxStatus::Processed)
    }

    /// Decode the message column into an envelope.
    pub fn envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        EventEnvelope::deserialize(&self.message)
    }
}
