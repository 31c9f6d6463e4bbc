//! PostgreSQL connection settings and pool construction
//!
//! Every component that talks to the database receives a pool built here at
//! startup; nothing opens its own pool.

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_USER: &str = "postgres";
const DEFAULT_PASSWORD: &str = "postgres";
const DEFAULT_DATABASE: &str = "outbox_demo";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maintenance database used to create the application database
pub const ADMIN_DATABASE: &str = "postgres";

/// Connection settings for the relay's database
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_database")]
    pub name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            user: default_user(),
            password: default_password(),
            name: default_database(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    /// Parse a `postgres://` URL into connection settings.
    pub fn from_url(url: &str) -> Result<Self, PoolError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| PoolError::InvalidUrl(e.to_string()))?;
        let password = url
            .split_once("://")
            .and_then(|(_, rest)| rest.split_once('@'))
            .and_then(|(credentials, _)| credentials.split_once(':'))
            .map(|(_, password)| password.to_string())
            .unwrap_or_default();

        Ok(Self {
            host: options.get_host().to_string(),
            port: options.get_port(),
            user: options.get_username().to_string(),
            password,
            name: options
                .get_database()
                .unwrap_or(DEFAULT_DATABASE)
                .to_string(),
            ..Self::default()
        })
    }

    /// Options for the application database.
    pub fn connect_options(&self) -> PgConnectOptions {
        self.connect_options_for(&self.name)
    }

    /// Options for the maintenance database on the same server.
    pub fn admin_connect_options(&self) -> PgConnectOptions {
        self.connect_options_for(ADMIN_DATABASE)
    }

    fn connect_options_for(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Build the shared pool for the application database.
///
/// # Errors
/// Returns [`PoolError::ConnectionFailed`] if the server is unreachable or
/// rejects the credentials.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, PoolError> {
    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        max_connections = config.max_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .connect_with(config.connect_options())
        .await
        .map_err(|e| PoolError::ConnectionFailed(e.to_string()))?;

    info!("PostgreSQL pool created");
    Ok(pool)
}

/// Errors that can occur when building the pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}
