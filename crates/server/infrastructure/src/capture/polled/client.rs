//! Stream client port
//!
//! The minimal surface of a sharded record stream (Kinesis-style) that the
//! polled source needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamClientError {
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Shard iterator expired")]
    ExpiredIterator,

    #[error("Read throughput exceeded: {0}")]
    Throttled(String),

    #[error("Stream service error: {0}")]
    Service(String),
}

/// Where a new shard iterator starts reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IteratorStart {
    /// Only records written after the iterator is created
    Latest,
    /// Right after the given sequence number
    AfterSequenceNumber(String),
}

/// One record read from a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub sequence_number: String,
    pub data: Vec<u8>,
    pub approximate_arrival: Option<DateTime<Utc>>,
}

/// Result of one read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    pub records: Vec<StreamRecord>,
    /// `None` once the shard is closed and fully read
    pub next_iterator: Option<String>,
    pub millis_behind_latest: Option<i64>,
}

#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Shard ids of `stream`, in the order the service reports them.
    async fn list_shards(&self, stream: &str) -> Result<Vec<String>, StreamClientError>;

    async fn shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        start: &IteratorStart,
    ) -> Result<String, StreamClientError>;

    async fn get_records(
        &self,
        iterator: &str,
        limit: Option<i32>,
    ) -> Result<RecordBatch, StreamClientError>;
}
