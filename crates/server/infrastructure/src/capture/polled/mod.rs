//! Polled stream capture
//!
//! Changes arrive through an external sharded stream (a DMS task replicating
//! the outbox table into Kinesis) and are pulled with a shard iterator.

pub mod client;
pub mod decode;
#[cfg(feature = "kinesis")]
pub mod kinesis;
pub mod source;

pub use client::{IteratorStart, RecordBatch, StreamClient, StreamClientError, StreamRecord};
pub use decode::{decode_stream_record, StreamDecodeError};
#[cfg(feature = "kinesis")]
pub use kinesis::KinesisStreamClient;
pub use source::PolledStreamSource;

use serde::{Deserialize, Serialize};

const DEFAULT_STREAM_NAME: &str = "outbox-stream";
const DEFAULT_REGION: &str = "us-east-1";

/// Stream settings for the polled source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_name")]
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Maximum records per read; the service default when unset
    #[serde(default)]
    pub batch_limit: Option<i32>,
}

fn default_stream_name() -> String {
    DEFAULT_STREAM_NAME.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: default_stream_name(),
            region: default_region(),
            batch_limit: None,
        }
    }
}
