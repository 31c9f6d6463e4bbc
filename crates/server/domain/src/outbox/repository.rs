//! Outbox Store and Transactional Writer Traits
//!
//! Abstractions for the atomic entity + event write and for the read/update
//! operations the relay and the read API need.

use crate::outbox::{OutboxError, OutboxEvent};
use crate::people::{NewPerson, Person, PersonValidationError};

/// Failure of the atomic entity + outbox write
///
/// The unit of work has been rolled back; neither row is visible.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Invalid person: {0}")]
    Invalid(#[from] PersonValidationError),

    #[error("Write failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Write failed, envelope could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Write failed: {message}")]
    InfrastructureError { message: String },
}

/// Performs a domain mutation and its outbox insertion as one atomic unit
#[async_trait::async_trait]
pub trait TransactionalWriter: Send + Sync {
    /// Insert a person and its `INSERT` outbox event in one transaction.
    ///
    /// # Errors
    /// * Returns [`WriteError`] if either insert or the commit fails. No retry
    ///   happens here; nothing is left behind on failure.
    async fn add_person(&self, person: NewPerson) -> Result<Person, WriteError>;
}

/// Read and status-update operations over people and outbox rows
#[async_trait::async_trait]
pub trait OutboxStore: Send + Sync {
    /// All people, newest first by creation time.
    async fn list_people(&self) -> Result<Vec<Person>, OutboxError>;

    /// The most recent outbox events, newest first, at most `limit`.
    async fn list_outbox_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxError>;

    /// Find an outbox event by id.
    async fn find_outbox_event(&self, id: i32) -> Result<Option<OutboxEvent>, OutboxError>;

    /// Transition an event from `pending` to `processed`, stamping `processed_at`.
    ///
    /// Idempotent: returns `Ok(false)` when the event is already processed or
    /// does not exist.
    async fn mark_processed(&self, id: i32) -> Result<bool, OutboxError>;
}
