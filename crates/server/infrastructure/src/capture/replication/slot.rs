//! Replication slot port and its PostgreSQL implementation
//!
//! [`PgReplicationSlot`] drives the slot through the SQL-level logical
//! decoding functions: changes are peeked (not consumed) and the slot is
//! advanced explicitly once they were processed.

use async_trait::async_trait;
use outbox_relay_domain::capture::{Lsn, ParseLsnError};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, info};

use crate::persistence::postgres::{has_sqlstate, quote_ident, SetupError, DUPLICATE_OBJECT};

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("Replication query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Replication slot {0} does not exist")]
    SlotMissing(String),

    #[error(transparent)]
    InvalidLsn(#[from] ParseLsnError),

    #[error("Undecodable change message at {lsn}: {message}")]
    Decode { lsn: Lsn, message: String },
}

/// One decoded-transaction message read from the slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalMessage {
    pub lsn: Lsn,
    /// wal2json output for one transaction
    pub data: String,
}

#[async_trait]
pub trait ReplicationSlot: Send + Sync {
    fn slot_name(&self) -> &str;

    /// Create the logical slot if missing. Returns `true` if it was created.
    async fn ensure_slot(&self) -> Result<bool, ReplicationError>;

    /// Create the publication over the outbox table if missing.
    async fn ensure_publication(&self) -> Result<bool, ReplicationError>;

    /// Position up to which the slot has confirmed delivery.
    async fn confirmed_position(&self) -> Result<Lsn, ReplicationError>;

    /// Read up to `limit` transactions past the confirmed position without
    /// consuming them.
    async fn peek(&self, limit: i32) -> Result<Vec<WalMessage>, ReplicationError>;

    /// Confirm delivery up to `lsn`.
    async fn advance(&self, lsn: Lsn) -> Result<(), ReplicationError>;
}

#[derive(FromRow)]
struct PeekRow {
    lsn: String,
    data: String,
}

/// Logical replication slot decoded with `wal2json`
#[derive(Clone)]
pub struct PgReplicationSlot {
    pool: PgPool,
    slot_name: String,
    publication_name: String,
    table: String,
}

impl PgReplicationSlot {
    pub const PLUGIN: &'static str = "wal2json";

    pub fn new(
        pool: PgPool,
        slot_name: impl Into<String>,
        publication_name: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            slot_name: slot_name.into(),
            publication_name: publication_name.into(),
            table: table.into(),
        }
    }

    /// Table filter in the form `wal2json` expects (`schema.table`).
    fn qualified_table(&self) -> String {
        if self.table.contains('.') {
            self.table.clone()
        } else {
            format!("public.{}", self.table)
        }
    }

    /// Table reference for SQL statements, each dotted part quoted.
    fn quoted_table(&self) -> Result<String, SetupError> {
        let parts = self
            .table
            .split('.')
            .map(quote_ident)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join("."))
    }

    /// Drop the slot. Used to tear down test databases.
    pub async fn drop_slot(&self) -> Result<(), ReplicationError> {
        sqlx::query(
            "SELECT pg_drop_replication_slot(slot_name) FROM pg_replication_slots WHERE slot_name = $1",
        )
        .bind(&self.slot_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReplicationSlot for PgReplicationSlot {
    fn slot_name(&self) -> &str {
        &self.slot_name
    }

    async fn ensure_slot(&self) -> Result<bool, ReplicationError> {
        let result = sqlx::query("SELECT pg_create_logical_replication_slot($1, $2)")
            .bind(&self.slot_name)
            .bind(Self::PLUGIN)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                info!(slot = %self.slot_name, plugin = Self::PLUGIN, "Replication slot created");
                Ok(true)
            }
            Err(e) if has_sqlstate(&e, DUPLICATE_OBJECT) => {
                debug!(slot = %self.slot_name, "Replication slot already exists");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_publication(&self) -> Result<bool, ReplicationError> {
        let statement = format!(
            "CREATE PUBLICATION {} FOR TABLE {}",
            quote_ident(&self.publication_name)?,
            self.quoted_table()?
        );

        match sqlx::query(&statement).execute(&self.pool).await {
            Ok(_) => {
                info!(publication = %self.publication_name, table = %self.table, "Publication created");
                Ok(true)
            }
            Err(e) if has_sqlstate(&e, DUPLICATE_OBJECT) => {
                debug!(publication = %self.publication_name, "Publication already exists");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn confirmed_position(&self) -> Result<Lsn, ReplicationError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT confirmed_flush_lsn::text FROM pg_replication_slots WHERE slot_name = $1",
        )
        .bind(&self.slot_name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((Some(lsn),)) => Ok(lsn.parse()?),
            Some((None,)) => Ok(Lsn::ZERO),
            None => Err(ReplicationError::SlotMissing(self.slot_name.clone())),
        }
    }

    async fn peek(&self, limit: i32) -> Result<Vec<WalMessage>, ReplicationError> {
        let rows: Vec<PeekRow> = sqlx::query_as::<_, PeekRow>(
            r#"
            SELECT lsn::text AS lsn, data
            FROM pg_logical_slot_peek_changes($1, NULL, $2,
                'format-version', '1',
                'include-timestamp', '1',
                'add-tables', $3)
            "#,
        )
        .bind(&self.slot_name)
        .bind(limit)
        .bind(self.qualified_table())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(WalMessage {
                    lsn: row.lsn.parse()?,
                    data: row.data,
                })
            })
            .collect()
    }

    async fn advance(&self, lsn: Lsn) -> Result<(), ReplicationError> {
        sqlx::query("SELECT pg_replication_slot_advance($1, $2::pg_lsn)")
            .bind(&self.slot_name)
            .bind(lsn.to_string())
            .execute(&self.pool)
            .await?;
        debug!(slot = %self.slot_name, lsn = %lsn, "Replication slot advanced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn slot_for(table: &str) -> PgReplicationSlot {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/outbox_demo")
            .unwrap();
        PgReplicationSlot::new(pool, "outbox_slot", "outbox_publication", table)
    }

    #[tokio::test]
    async fn test_table_names_for_statements_and_filters() {
        let plain = slot_for("outbox");
        assert_eq!(plain.quoted_table().unwrap(), r#""outbox""#);
        assert_eq!(plain.qualified_table(), "public.outbox");

        let qualified = slot_for("relay.outbox");
        assert_eq!(qualified.quoted_table().unwrap(), r#""relay"."outbox""#);
        assert_eq!(qualified.qualified_table(), "relay.outbox");

        assert!(slot_for("relay.").quoted_table().is_err());
    }
}
