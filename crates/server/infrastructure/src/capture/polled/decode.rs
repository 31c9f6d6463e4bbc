//! Stream record decoding
//!
//! Two payload shapes are understood:
//!
//! * DMS change records:
//!   `{"data": {..row..}, "metadata": {"record-type": "data", "operation": "insert", "table-name": "outbox", ..}}`
//! * Stream images:
//!   `{"eventName": "INSERT", "dynamodb": {"NewImage": {"id": {"N": "1"}, "message": {"S": "{..}"}}}}`

use outbox_relay_domain::capture::{
    ChangeBody, ChangeOperation, ChangeRecord, Position, UnknownOperation,
};
use serde_json::{Map, Value};

use super::client::StreamRecord;

#[derive(Debug, thiserror::Error)]
pub enum StreamDecodeError {
    #[error("Stream record is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized stream record shape")]
    UnrecognizedShape,

    #[error(transparent)]
    Operation(#[from] UnknownOperation),
}

/// Decode a raw stream record.
///
/// Returns `Ok(None)` for records that carry no row change (DMS control
/// records). `default_table` names the table for image records, which do not
/// carry one.
pub fn decode_stream_record(
    record: &StreamRecord,
    default_table: &str,
) -> Result<Option<ChangeRecord>, StreamDecodeError> {
    let payload: Value = serde_json::from_slice(&record.data)?;
    let position = Position::SequenceNumber(record.sequence_number.clone());

    if let (Some(Value::Object(data)), Some(metadata)) = (payload.get("data"), payload.get("metadata")) {
        return decode_dms(position, data, metadata, default_table);
    }

    if let Some(event_name) = payload.get("eventName").and_then(Value::as_str) {
        return decode_image(position, event_name, &payload, default_table).map(Some);
    }

    Err(StreamDecodeError::UnrecognizedShape)
}

fn decode_dms(
    position: Position,
    data: &Map<String, Value>,
    metadata: &Value,
    default_table: &str,
) -> Result<Option<ChangeRecord>, StreamDecodeError> {
    let record_type = metadata.get("record-type").and_then(Value::as_str).unwrap_or("data");
    if record_type != "data" {
        return Ok(None);
    }

    let operation = match metadata.get("operation").and_then(Value::as_str) {
        // full-load rows are initial inserts
        Some("load") => ChangeOperation::Insert,
        Some(op) => op.parse()?,
        None => return Err(StreamDecodeError::UnrecognizedShape),
    };
    let table_name = metadata
        .get("table-name")
        .and_then(Value::as_str)
        .unwrap_or(default_table)
        .to_string();

    Ok(Some(ChangeRecord {
        position,
        operation,
        table_name,
        body: ChangeBody::Columns(data.clone()),
    }))
}

fn decode_image(
    position: Position,
    event_name: &str,
    payload: &Value,
    default_table: &str,
) -> Result<ChangeRecord, StreamDecodeError> {
    let operation = match event_name {
        "MODIFY" => ChangeOperation::Update,
        "REMOVE" => ChangeOperation::Delete,
        other => other.parse()?,
    };

    let image_key = if operation == ChangeOperation::Delete {
        "OldImage"
    } else {
        "NewImage"
    };
    let image = payload
        .get("dynamodb")
        .and_then(|d| d.get(image_key))
        .and_then(Value::as_object)
        .ok_or(StreamDecodeError::UnrecognizedShape)?;

    let columns = image
        .iter()
        .map(|(name, value)| (name.clone(), unwrap_attribute(value)))
        .collect();

    Ok(ChangeRecord {
        position,
        operation,
        table_name: default_table.to_string(),
        body: ChangeBody::Columns(columns),
    })
}

/// Strip a single-key type descriptor (`{"S": ..}`, `{"N": ..}`, `{"M": ..}`).
fn unwrap_attribute(value: &Value) -> Value {
    let Some(object) = value.as_object().filter(|o| o.len() == 1) else {
        return value.clone();
    };
    match object.iter().next() {
        Some((tag, inner)) if matches!(tag.as_str(), "S" | "N" | "BOOL" | "NULL") => {
            if tag == "NULL" {
                Value::Null
            } else {
                inner.clone()
            }
        }
        Some((tag, Value::Object(map))) if tag == "M" => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), unwrap_attribute(v)))
                .collect(),
        ),
        Some((tag, Value::Array(items))) if tag == "L" => {
            Value::Array(items.iter().map(unwrap_attribute).collect())
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream_record(seq: &str, payload: Value) -> StreamRecord {
        StreamRecord {
            sequence_number: seq.to_string(),
            data: serde_json::to_vec(&payload).unwrap(),
            approximate_arrival: None,
        }
    }

    fn envelope() -> Value {
        json!({
            "event_type": "INSERT",
            "table_name": "people",
            "data": {"id": 1, "first_name": "Ada", "last_name": "Lovelace"},
            "timestamp": 1_700_000_000
        })
    }

    #[test]
    fn test_decode_dms_insert() {
        let record = stream_record(
            "4960",
            json!({
                "data": {"id": 12, "message": envelope(), "status": "pending"},
                "metadata": {
                    "record-type": "data",
                    "operation": "insert",
                    "schema-name": "public",
                    "table-name": "outbox"
                }
            }),
        );

        let change = decode_stream_record(&record, "outbox").unwrap().unwrap();
        assert_eq!(change.position, Position::SequenceNumber("4960".into()));
        assert_eq!(change.operation, ChangeOperation::Insert);
        assert_eq!(change.table_name, "outbox");
        let (id, env) = change.decode().unwrap();
        assert_eq!(id, 12);
        assert_eq!(env.data["last_name"], "Lovelace");
    }

    #[test]
    fn test_dms_control_records_are_ignored() {
        let record = stream_record(
            "1",
            json!({"data": {}, "metadata": {"record-type": "control", "operation": "create-table"}}),
        );
        assert!(decode_stream_record(&record, "outbox").unwrap().is_none());
    }

    #[test]
    fn test_dms_load_is_an_insert_and_update_keeps_its_kind() {
        let load = stream_record(
            "1",
            json!({"data": {"id": 1}, "metadata": {"operation": "load", "table-name": "outbox"}}),
        );
        let change = decode_stream_record(&load, "outbox").unwrap().unwrap();
        assert_eq!(change.operation, ChangeOperation::Insert);

        let update = stream_record(
            "2",
            json!({"data": {"id": 1}, "metadata": {"operation": "update", "table-name": "outbox"}}),
        );
        let change = decode_stream_record(&update, "outbox").unwrap().unwrap();
        assert_eq!(change.operation, ChangeOperation::Update);
    }

    #[test]
    fn test_decode_image_insert() {
        let record = stream_record(
            "77",
            json!({
                "eventName": "INSERT",
                "dynamodb": {
                    "NewImage": {
                        "id": {"N": "5"},
                        "message": {"S": envelope().to_string()},
                        "status": {"S": "pending"}
                    }
                }
            }),
        );

        let change = decode_stream_record(&record, "outbox").unwrap().unwrap();
        assert_eq!(change.table_name, "outbox");
        assert_eq!(change.operation, ChangeOperation::Insert);
        let (id, env) = change.decode().unwrap();
        assert_eq!(id, 5);
        assert_eq!(env.event_type, "INSERT");
    }

    #[test]
    fn test_image_remove_reads_old_image() {
        let record = stream_record(
            "78",
            json!({"eventName": "REMOVE", "dynamodb": {"OldImage": {"id": {"N": "5"}}}}),
        );
        let change = decode_stream_record(&record, "outbox").unwrap().unwrap();
        assert_eq!(change.operation, ChangeOperation::Delete);
        assert_eq!(change.message_id(), Some(5));
    }

    #[test]
    fn test_unwrap_nested_attributes() {
        let value = json!({"M": {"a": {"S": "x"}, "b": {"L": [{"N": "1"}, {"NULL": true}]}}});
        assert_eq!(unwrap_attribute(&value), json!({"a": "x", "b": ["1", null]}));
        assert_eq!(unwrap_attribute(&json!({"a": 1, "b": 2})), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_decode_errors() {
        let not_json = StreamRecord {
            sequence_number: "1".into(),
            data: b"\x00\x01".to_vec(),
            approximate_arrival: None,
        };
        assert!(matches!(
            decode_stream_record(&not_json, "outbox"),
            Err(StreamDecodeError::Json(_))
        ));

        let unknown = stream_record("2", json!({"hello": "world"}));
        assert!(matches!(
            decode_stream_record(&unknown, "outbox"),
            Err(StreamDecodeError::UnrecognizedShape)
        ));

        let bad_op = stream_record(
            "3",
            json!({"data": {}, "metadata": {"operation": "merge"}}),
        );
        assert!(matches!(
            decode_stream_record(&bad_op, "outbox"),
            Err(StreamDecodeError::Operation(_))
        ));
    }
}
