//! Change records produced by capture sources

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::position::Position;
use crate::outbox::EventEnvelope;

/// Row-level operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown change operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for ChangeOperation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" | "i" => Ok(ChangeOperation::Insert),
            "update" | "u" => Ok(ChangeOperation::Update),
            "delete" | "d" => Ok(ChangeOperation::Delete),
            _ => Err(UnknownOperation(s.to_string())),
        }
    }
}

/// What a change record carries
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeBody {
    /// Envelope already decoded by the source
    Envelope {
        message_id: i32,
        envelope: EventEnvelope,
    },
    /// Raw outbox row columns; `message` embeds the envelope
    Columns(Map<String, Value>),
}

/// Errors decoding the envelope out of a change record
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Missing column: {0}")]
    MissingColumn(&'static str),

    #[error("Invalid message id: {0}")]
    InvalidId(String),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),
}

/// A single captured change
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub position: Position,
    pub operation: ChangeOperation,
    pub table_name: String,
    pub body: ChangeBody,
}

impl ChangeRecord {
    /// Extract the outbox id and the envelope carried by this record.
    pub fn decode(&self) -> Result<(i32, EventEnvelope), DecodeError> {
        match &self.body {
            ChangeBody::Envelope {
                message_id,
                envelope,
            } => Ok((*message_id, envelope.clone())),
            ChangeBody::Columns(columns) => {
                let id = columns.get("id").ok_or(DecodeError::MissingColumn("id"))?;
                let id = parse_id(id)?;
                let message = columns
                    .get("message")
                    .ok_or(DecodeError::MissingColumn("message"))?;
                // jsonb columns arrive as text from both wal2json and DMS
                let envelope = match message {
                    Value::String(text) => serde_json::from_str(text)?,
                    other => EventEnvelope::deserialize(other)?,
                };
                Ok((id, envelope))
            }
        }
    }

    /// The outbox id, if it can be read without decoding the envelope.
    pub fn message_id(&self) -> Option<i32> {
        match &self.body {
            ChangeBody::Envelope { message_id, .. } => Some(*message_id),
            ChangeBody::Columns(columns) => columns.get("id").and_then(|v| parse_id(v).ok()),
        }
    }
}

fn parse_id(value: &Value) -> Result<i32, DecodeError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| DecodeError::InvalidId(value.to_string()))
}

/// Records returned by one fetch, plus where the source resumes afterwards
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    pub records: Vec<ChangeRecord>,
    /// Acknowledged once every record of the batch was delivered
    pub resume_from: Option<Position>,
}

impl ChangeBatch {
    pub fn new(records: Vec<ChangeRecord>, resume_from: Option<Position>) -> Self {
        Self {
            records,
            resume_from,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::position::Lsn;
    use serde_json::json;

    fn columns(value: Value) -> ChangeRecord {
        let Value::Object(map) = value else {
            panic!("expected object");
        };
        ChangeRecord {
            position: Position::Lsn(Lsn::new(1)),
            operation: ChangeOperation::Insert,
            table_name: "outbox".into(),
            body: ChangeBody::Columns(map),
        }
    }

    fn envelope_json() -> Value {
        json!({
            "event_type": "INSERT",
            "table_name": "people",
            "data": {"id": 1, "first_name": "Ada"},
            "timestamp": 1_700_000_000
        })
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("INSERT".parse::<ChangeOperation>().unwrap(), ChangeOperation::Insert);
        assert_eq!("update".parse::<ChangeOperation>().unwrap(), ChangeOperation::Update);
        assert_eq!("D".parse::<ChangeOperation>().unwrap(), ChangeOperation::Delete);
        assert!("truncate".parse::<ChangeOperation>().is_err());
    }

    #[test]
    fn test_decode_columns_with_text_message() {
        let record = columns(json!({
            "id": 42,
            "message": envelope_json().to_string(),
            "status": "pending",
        }));
        let (id, envelope) = record.decode().unwrap();
        assert_eq!(id, 42);
        assert_eq!(envelope.event_type, "INSERT");
        assert_eq!(envelope.data["first_name"], "Ada");
    }

    #[test]
    fn test_decode_columns_with_object_message_and_string_id() {
        let record = columns(json!({"id": "17", "message": envelope_json()}));
        let (id, envelope) = record.decode().unwrap();
        assert_eq!(id, 17);
        assert_eq!(envelope.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_decode_errors() {
        let missing = columns(json!({"message": envelope_json()}));
        assert!(matches!(missing.decode(), Err(DecodeError::MissingColumn("id"))));

        let bad_id = columns(json!({"id": "abc", "message": envelope_json()}));
        assert!(matches!(bad_id.decode(), Err(DecodeError::InvalidId(_))));

        let bad_message = columns(json!({"id": 1, "message": "{not json"}));
        assert!(matches!(bad_message.decode(), Err(DecodeError::InvalidEnvelope(_))));

        let wrong_shape = columns(json!({"id": 1, "message": {"event_type": 5}}));
        assert!(matches!(wrong_shape.decode(), Err(DecodeError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_message_id_without_envelope() {
        let record = columns(json!({"id": "9", "message": "{not json"}));
        assert_eq!(record.message_id(), Some(9));
        assert_eq!(columns(json!({"message": "x"})).message_id(), None);
    }
}
