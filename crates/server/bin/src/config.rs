//! Server configuration
//!
//! Layered with the `config` crate, later sources winning:
//! built-in defaults, `config/default.toml`, `config/{RUN_MODE}.toml`, the
//! `--config` file, `OUTBOX__SECTION__KEY` environment variables, then the
//! plain variables older deployments use (`DB_HOST`, `PORT`, ...).

use outbox_relay_infrastructure::capture::{BackoffConfig, CaptureSessionConfig};
use outbox_relay_infrastructure::capture::polled::StreamConfig;
use outbox_relay_infrastructure::capture::replication::ReplicationConfig;
use outbox_relay_infrastructure::logs::LogsConfig;
use outbox_relay_infrastructure::persistence::postgres::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "OUTBOX";

/// Plain environment variables mapped onto configuration keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("DB_HOST", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_NAME", "database.name"),
    ("KINESIS_STREAM_NAME", "stream.name"),
    ("AWS_REGION", "stream.region"),
    ("PORT", "http.port"),
];

/// Which change-capture strategy the relay runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Poll an external stream fed from the outbox table
    Polled,
    /// Read a logical replication slot on the outbox table
    Replication,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureMode::Polled => write!(f, "polled"),
            CaptureMode::Replication => write!(f, "replication"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    pub poll_interval_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            mode: CaptureMode::Replication,
            poll_interval_ms: CaptureSessionConfig::default().poll_interval.as_millis() as u64,
            retry_base_delay_ms: backoff.base_delay_ms,
            retry_max_delay_ms: backoff.max_delay_ms,
            retry_jitter: backoff.jitter_factor,
        }
    }
}

impl CaptureConfig {
    pub fn session_config(&self) -> CaptureSessionConfig {
        CaptureSessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            backoff: BackoffConfig::new(
                self.retry_base_delay_ms,
                self.retry_max_delay_ms,
                self.retry_jitter,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl HttpConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl AppConfig {
    /// Load from the process environment and the default file locations.
    pub fn load(file: Option<&Path>, mode: Option<CaptureMode>) -> anyhow::Result<Self> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config = Self::build(&run_mode, file, mode, None)?;
        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Layer every source. `vars` replaces the process environment when set.
    fn build(
        run_mode: &str,
        file: Option<&Path>,
        mode: Option<CaptureMode>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        let lookup = |key: &str| match &vars {
            Some(vars) => vars.get(key).cloned(),
            None => env::var(key).ok(),
        };

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false));

        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(vars.clone()),
        );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, lookup(var))?;
        }
        builder = builder.set_override_option("capture.mode", mode.map(|m| m.to_string()))?;

        builder.build()?.try_deserialize()
    }
}
