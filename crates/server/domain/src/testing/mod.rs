//! In-memory adapters
//!
//! Implementations of the domain ports backed by process memory, for unit
//! tests and for running the HTTP surface without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::outbox::{
    EventEnvelope, OutboxError, OutboxEvent, OutboxStatus, OutboxStore, TransactionalWriter,
    WriteError,
};
use crate::people::{NewPerson, Person};
use crate::processing::{ErrorLogEntry, ErrorSink, ProcessedLog, ProcessedLogEntry, ProcessedLogError};

#[derive(Debug, Default)]
struct StoreState {
    people: Vec<Person>,
    outbox: Vec<OutboxEvent>,
    next_person_id: i32,
    next_event_id: i32,
    fail_outbox_insert: bool,
}

/// People and outbox tables held in memory
///
/// `add_person` inserts both rows under one lock, so either both are visible
/// or neither is.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOutboxStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next outbox inserts fail, simulating a broken second statement.
    pub async fn fail_outbox_inserts(&self, fail: bool) {
        self.state.lock().await.fail_outbox_insert = fail;
    }

    pub async fn people_count(&self) -> usize {
        self.state.lock().await.people.len()
    }

    pub async fn outbox_count(&self) -> usize {
        self.state.lock().await.outbox.len()
    }
}

#[async_trait]
impl TransactionalWriter for InMemoryOutboxStore {
    async fn add_person(&self, person: NewPerson) -> Result<Person, WriteError> {
        let mut state = self.state.lock().await;

        let person = Person {
            id: state.next_person_id + 1,
            first_name: person.first_name().to_string(),
            last_name: person.last_name().to_string(),
            created_at: Utc::now(),
        };
        let envelope = EventEnvelope::for_person_insert(&person)?;

        if state.fail_outbox_insert {
            return Err(WriteError::InfrastructureError {
                message: "outbox insert rejected".to_string(),
            });
        }

        let event = OutboxEvent {
            id: state.next_event_id + 1,
            message: serde_json::to_value(&envelope)?,
            status: OutboxStatus::Pending,
            created_at: person.created_at,
            processed_at: None,
        };

        state.next_person_id = person.id;
        state.next_event_id = event.id;
        state.people.push(person.clone());
        state.outbox.push(event);
        Ok(person)
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn list_people(&self) -> Result<Vec<Person>, OutboxError> {
        let state = self.state.lock().await;
        Ok(state.people.iter().rev().cloned().collect())
    }

    async fn list_outbox_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxError> {
        let state = self.state.lock().await;
        Ok(state.outbox.iter().rev().take(limit).cloned().collect())
    }

    async fn find_outbox_event(&self, id: i32) -> Result<Option<OutboxEvent>, OutboxError> {
        let state = self.state.lock().await;
        Ok(state.outbox.iter().find(|e| e.id == id).cloned())
    }

    async fn mark_processed(&self, id: i32) -> Result<bool, OutboxError> {
        let mut state = self.state.lock().await;
        match state
            .outbox
            .iter_mut()
            .find(|e| e.id == id && e.status == OutboxStatus::Pending)
        {
            Some(event) => {
                event.status = OutboxStatus::Processed;
                event.processed_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Processed log held in memory
#[derive(Clone, Debug, Default)]
pub struct InMemoryProcessedLog {
    entries: Arc<Mutex<Vec<ProcessedLogEntry>>>,
    ids: Arc<Mutex<HashSet<i32>>>,
}

impl InMemoryProcessedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in append order.
    pub async fn entries(&self) -> Vec<ProcessedLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ProcessedLog for InMemoryProcessedLog {
    async fn append(&self, entry: &ProcessedLogEntry) -> Result<(), ProcessedLogError> {
        self.entries.lock().await.push(entry.clone());
        self.ids.lock().await.insert(entry.message_id);
        Ok(())
    }

    async fn contains(&self, message_id: i32) -> Result<bool, ProcessedLogError> {
        Ok(self.ids.lock().await.contains(&message_id))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ProcessedLogEntry>, ProcessedLogError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

/// Error sink that keeps every recorded entry
#[derive(Clone, Debug, Default)]
pub struct RecordingErrorSink {
    entries: Arc<Mutex<Vec<ErrorLogEntry>>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ErrorSink for RecordingErrorSink {
    async fn record(&self, context: &str, error: &(dyn std::error::Error + Send + Sync + 'static)) {
        self.entries.lock().await.push(ErrorLogEntry::new(context, error));
    }
}
