//! Log-based replication capture
//!
//! Changes are decoded from the write-ahead log through a logical
//! replication slot using the `wal2json` output plugin. The slot keeps the
//! confirmed position on the server, so delivery resumes after a restart.

pub mod slot;
pub mod source;
pub mod wal2json;

pub use slot::{PgReplicationSlot, ReplicationError, ReplicationSlot, WalMessage};
pub use source::LogReplicationSource;
pub use wal2json::decode_transaction;

use outbox_relay_domain::outbox::OUTBOX_TABLE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_SLOT_NAME: &str = "outbox_slot";
const DEFAULT_PUBLICATION_NAME: &str = "outbox_publication";
const DEFAULT_ACK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BATCH_SIZE: i32 = 100;

/// Replication slot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default = "default_slot_name")]
    pub slot_name: String,
    #[serde(default = "default_publication_name")]
    pub publication_name: String,
    #[serde(default = "default_outbox_table")]
    pub outbox_table: String,
    /// 0 confirms every record as soon as it is processed
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
    /// Upper bound of transactions read per fetch
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,
}

fn default_slot_name() -> String {
    DEFAULT_SLOT_NAME.to_string()
}

fn default_publication_name() -> String {
    DEFAULT_PUBLICATION_NAME.to_string()
}

fn default_outbox_table() -> String {
    OUTBOX_TABLE.to_string()
}

fn default_ack_timeout() -> u64 {
    DEFAULT_ACK_TIMEOUT_SECS
}

fn default_batch_size() -> i32 {
    DEFAULT_BATCH_SIZE
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            slot_name: default_slot_name(),
            publication_name: default_publication_name(),
            outbox_table: default_outbox_table(),
            ack_timeout_secs: DEFAULT_ACK_TIMEOUT_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ReplicationConfig {
    pub fn ack_mode(&self) -> AckMode {
        if self.ack_timeout_secs == 0 {
            AckMode::PerRecord
        } else {
            AckMode::Periodic(Duration::from_secs(self.ack_timeout_secs))
        }
    }
}

/// When processed positions are confirmed to the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// As soon as every record of a transaction was processed
    PerRecord,
    /// At most once per interval, and on close
    Periodic(Duration),
}
