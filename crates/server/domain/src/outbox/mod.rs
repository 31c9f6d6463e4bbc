//! Outbox Pattern Module
//!
//! Provides the outbox event model and the ports used by the transactional
//! writer, the relay and the read API.

pub mod model;
pub mod repository;

pub use model::{
    EventEnvelope, OutboxError, OutboxEvent, OutboxStatus, DEFAULT_OUTBOX_PAGE, INSERT_EVENT,
    OUTBOX_TABLE,
};
pub use repository::{OutboxStore, TransactionalWriter, WriteError};
