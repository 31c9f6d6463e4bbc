//! wal2json (format version 1) decoding
//!
//! One message per transaction:
//!
//! ```json
//! {"change": [{"kind": "insert", "schema": "public", "table": "outbox",
//!              "columnnames": ["id", "message", ...],
//!              "columnvalues": [1, "{\"event_type\": ...}", ...]}]}
//! ```

use outbox_relay_domain::capture::{ChangeBody, ChangeOperation, ChangeRecord, Position};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::slot::{ReplicationError, WalMessage};

#[derive(Debug, Deserialize)]
struct Transaction {
    #[serde(default)]
    change: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    kind: String,
    #[serde(default)]
    table: String,
    #[serde(default)]
    columnnames: Vec<String>,
    #[serde(default)]
    columnvalues: Vec<Value>,
    #[serde(default)]
    oldkeys: Option<OldKeys>,
}

#[derive(Debug, Deserialize)]
struct OldKeys {
    #[serde(default)]
    keynames: Vec<String>,
    #[serde(default)]
    keyvalues: Vec<Value>,
}

/// Decode one transaction message into change records, in change order.
///
/// Every record carries the transaction's LSN. Non-row entries (logical
/// messages, truncates) are dropped.
pub fn decode_transaction(message: &WalMessage) -> Result<Vec<ChangeRecord>, ReplicationError> {
    let transaction: Transaction =
        serde_json::from_str(&message.data).map_err(|e| ReplicationError::Decode {
            lsn: message.lsn,
            message: e.to_string(),
        })?;

    let mut records = Vec::with_capacity(transaction.change.len());
    for change in transaction.change {
        let Ok(operation) = change.kind.parse::<ChangeOperation>() else {
            continue;
        };

        let columns: Map<String, Value> = match (operation, change.oldkeys) {
            (ChangeOperation::Delete, Some(keys)) => {
                keys.keynames.into_iter().zip(keys.keyvalues).collect()
            }
            _ => change.columnnames.into_iter().zip(change.columnvalues).collect(),
        };

        records.push(ChangeRecord {
            position: Position::Lsn(message.lsn),
            operation,
            table_name: change.table,
            body: ChangeBody::Columns(columns),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_relay_domain::capture::Lsn;
    use serde_json::json;

    fn message(lsn: u64, data: Value) -> WalMessage {
        WalMessage {
            lsn: Lsn::new(lsn),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_decode_insert_transaction() {
        let envelope = json!({
            "event_type": "INSERT",
            "table_name": "people",
            "data": {"id": 1, "first_name": "Ada", "last_name": "Lovelace"},
            "timestamp": 1_700_000_000
        });
        let msg = message(
            0x16B_3748,
            json!({
                "timestamp": "2024-01-01 00:00:00+00",
                "change": [{
                    "kind": "insert",
                    "schema": "public",
                    "table": "outbox",
                    "columnnames": ["id", "message", "status", "created_at", "processed_at"],
                    "columntypes": ["integer", "jsonb", "character varying(20)", "timestamp with time zone", "timestamp with time zone"],
                    "columnvalues": [1, envelope.to_string(), "pending", "2024-01-01 00:00:00+00", null]
                }]
            }),
        );

        let records = decode_transaction(&msg).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.position, Position::Lsn(Lsn::new(0x16B_3748)));
        assert_eq!(record.operation, ChangeOperation::Insert);
        assert_eq!(record.table_name, "outbox");

        let (id, decoded) = record.decode().unwrap();
        assert_eq!(id, 1);
        assert_eq!(decoded.data["last_name"], "Lovelace");
    }

    #[test]
    fn test_multi_change_transaction_keeps_order_and_lsn() {
        let msg = message(
            500,
            json!({"change": [
                {"kind": "insert", "table": "outbox", "columnnames": ["id"], "columnvalues": [1]},
                {"kind": "update", "table": "outbox", "columnnames": ["id", "status"], "columnvalues": [1, "processed"]},
                {"kind": "delete", "table": "outbox", "oldkeys": {"keynames": ["id"], "keyvalues": [1]}},
                {"kind": "message", "prefix": "x", "content": "y"}
            ]}),
        );

        let records = decode_transaction(&msg).unwrap();
        let ops: Vec<ChangeOperation> = records.iter().map(|r| r.operation).collect();
        assert_eq!(
            ops,
            vec![ChangeOperation::Insert, ChangeOperation::Update, ChangeOperation::Delete]
        );
        assert!(records.iter().all(|r| r.position == Position::Lsn(Lsn::new(500))));
        assert_eq!(records[2].message_id(), Some(1));
    }

    #[test]
    fn test_empty_transaction() {
        let records = decode_transaction(&message(1, json!({"change": []}))).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let msg = WalMessage {
            lsn: Lsn::new(9),
            data: "{\"change\": [".into(),
        };
        assert!(matches!(
            decode_transaction(&msg),
            Err(ReplicationError::Decode { .. })
        ));
    }
}
