//! PostgreSQL Outbox Store
//!
//! SQLx-based implementation of [`OutboxStore`] and [`TransactionalWriter`].
//! The person row and its outbox event are written in one transaction.

use outbox_relay_domain::outbox::{
    EventEnvelope, OutboxError, OutboxEvent, OutboxStatus, OutboxStore, TransactionalWriter,
    WriteError,
};
use outbox_relay_domain::people::{NewPerson, Person};
use sqlx::postgres::{PgPool, PgTransaction};
use sqlx::FromRow;
use tracing::debug;

/// Row struct for outbox queries
#[derive(FromRow)]
struct OutboxRow {
    id: i32,
    message: sqlx::types::Json<serde_json::Value>,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = OutboxError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxEvent {
            id: row.id,
            message: row.message.0,
            status: row.status.parse::<OutboxStatus>()?,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

/// PostgreSQL implementation of the outbox store and transactional writer
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_person_with_tx(
        tx: &mut PgTransaction<'_>,
        person: &NewPerson,
    ) -> Result<Person, sqlx::Error> {
        sqlx::query_as::<_, Person>(
            r#"
            INSERT INTO people (first_name, last_name)
            VALUES ($1, $2)
            RETURNING id, first_name, last_name, created_at
            "#,
        )
        .bind(person.first_name())
        .bind(person.last_name())
        .fetch_one(&mut **tx)
        .await
    }

    async fn insert_event_with_tx(
        tx: &mut PgTransaction<'_>,
        envelope: &EventEnvelope,
    ) -> Result<i32, WriteError> {
        let message = serde_json::to_value(envelope)?;
        let (id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO outbox (message, status)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(sqlx::types::Json(message))
        .bind(OutboxStatus::Pending.as_str())
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }
}

#[async_trait::async_trait]
impl TransactionalWriter for PostgresOutboxStore {
    async fn add_person(&self, person: NewPerson) -> Result<Person, WriteError> {
        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        let person = Self::insert_person_with_tx(&mut tx, &person).await?;
        let envelope = EventEnvelope::for_person_insert(&person)?;
        let event_id = Self::insert_event_with_tx(&mut tx, &envelope).await?;

        tx.commit().await?;

        debug!(person_id = person.id, event_id, "Person and outbox event committed");
        Ok(person)
    }
}

#[async_trait::async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn list_people(&self) -> Result<Vec<Person>, OutboxError> {
        let people = sqlx::query_as::<_, Person>(
            r#"
            SELECT id, first_name, last_name, created_at
            FROM people
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(people)
    }

    async fn list_outbox_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxError> {
        let rows: Vec<OutboxRow> = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, message, status, created_at, processed_at
            FROM outbox
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxEvent::try_from).collect()
    }

    async fn find_outbox_event(&self, id: i32) -> Result<Option<OutboxEvent>, OutboxError> {
        let row: Option<OutboxRow> = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, message, status, created_at, processed_at
            FROM outbox
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OutboxEvent::try_from).transpose()
    }

    async fn mark_processed(&self, id: i32) -> Result<bool, OutboxError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = $2, processed_at = NOW()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(id)
        .bind(OutboxStatus::Processed.as_str())
        .bind(OutboxStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
