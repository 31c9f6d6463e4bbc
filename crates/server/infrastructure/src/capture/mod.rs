//! Capture adapters
//!
//! Two [`ChangeCaptureSource`](outbox_relay_domain::capture::ChangeCaptureSource)
//! implementations and the session that drives either of them:
//! - polled: a sharded stream read through shard iterators
//! - replication: a PostgreSQL logical replication slot

pub mod backoff;
pub mod polled;
pub mod replication;
pub mod session;

pub use backoff::BackoffConfig;
pub use polled::{PolledStreamSource, StreamClient, StreamConfig};
pub use replication::{LogReplicationSource, PgReplicationSlot, ReplicationConfig, ReplicationSlot};
pub use session::{CaptureMetrics, CaptureSession, CaptureSessionConfig};
