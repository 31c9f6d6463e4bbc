//! Schema bootstrap
//!
//! Idempotent creation of the application database and the `people` and
//! `outbox` tables. Running it against an already bootstrapped server is a
//! no-op; "already exists" errors are treated as success.

use sqlx::postgres::PgPool;
use sqlx::{ConnectOptions, Connection};
use thiserror::Error;
use tracing::{debug, info};

use super::pool::DatabaseConfig;

/// SQLSTATE `duplicate_database`
pub const DUPLICATE_DATABASE: &str = "42P04";
/// SQLSTATE `duplicate_object` (replication slots, publications)
pub const DUPLICATE_OBJECT: &str = "42710";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Setup failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// Whether `err` is a database error carrying `code`.
pub fn has_sqlstate(err: &sqlx::Error, code: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|c| c == code)
}

/// Quote an identifier for statements that cannot take bind parameters.
pub fn quote_ident(ident: &str) -> Result<String, SetupError> {
    if ident.is_empty() || ident.contains('\0') {
        return Err(SetupError::InvalidIdentifier(ident.to_string()));
    }
    Ok(format!("\"{}\"", ident.replace('"', "\"\"")))
}

/// Create the application database if it does not exist.
///
/// Connects to the maintenance database with the same credentials. Returns
/// `true` if the database was created.
pub async fn ensure_database(config: &DatabaseConfig) -> Result<bool, SetupError> {
    let mut conn = config.admin_connect_options().connect().await?;
    let statement = format!("CREATE DATABASE {}", quote_ident(&config.name)?);

    let created = match sqlx::query(&statement).execute(&mut conn).await {
        Ok(_) => {
            info!(database = %config.name, "Database created");
            true
        }
        Err(e) if has_sqlstate(&e, DUPLICATE_DATABASE) => {
            debug!(database = %config.name, "Database already exists");
            false
        }
        Err(e) => return Err(e.into()),
    };

    conn.close().await?;
    Ok(created)
}

/// Create the `people` and `outbox` tables if they do not exist.
pub async fn ensure_tables(pool: &PgPool) -> Result<(), SetupError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS people (
            id SERIAL PRIMARY KEY,
            first_name VARCHAR(100) NOT NULL,
            last_name VARCHAR(100) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outbox (
            id SERIAL PRIMARY KEY,
            message JSONB NOT NULL,
            status VARCHAR(20) NOT NULL DEFAULT 'pending',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            processed_at TIMESTAMPTZ NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Tables ready: people, outbox");
    Ok(())
}
