//! Startup module - wires configuration into running components.
//!
//! - `setup`: database, tables and (replication mode) slot and publication
//! - `serve`: HTTP API plus the capture session in one process
//! - `relay`: the capture session alone

pub mod shutdown;

use anyhow::Context;
use outbox_relay_domain::capture::{CaptureError, ChangeCaptureSource};
use outbox_relay_domain::outbox::{OutboxStore, TransactionalWriter, OUTBOX_TABLE};
use outbox_relay_domain::processing::{ErrorSink, MessageProcessor, ProcessedLog};
use outbox_relay_infrastructure::capture::replication::{
    LogReplicationSource, PgReplicationSlot, ReplicationSlot,
};
use outbox_relay_infrastructure::capture::{CaptureMetrics, CaptureSession};
use outbox_relay_infrastructure::logs::{FileErrorSink, FileProcessedLog};
use outbox_relay_infrastructure::persistence::postgres::{
    connect, ensure_database, ensure_tables, PostgresOutboxStore,
};
use outbox_relay_interface::{api_router, ApiState};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{AppConfig, CaptureMode};
use shutdown::{drain, start_signal_handler, GracefulShutdown, ShutdownConfig, ShutdownReason};

/// Current application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handles shared by the HTTP API and the capture session.
struct AppState {
    pool: PgPool,
    store: Arc<PostgresOutboxStore>,
    processed: Arc<FileProcessedLog>,
    errors: Arc<FileErrorSink>,
}

impl AppState {
    async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = connect_to_database(config).await?;
        let processed = FileProcessedLog::open(&config.logs.processed_path)
            .await
            .with_context(|| format!("Failed to open {}", config.logs.processed_path.display()))?;
        let errors = FileErrorSink::open(&config.logs.error_path)
            .await
            .with_context(|| format!("Failed to open {}", config.logs.error_path.display()))?;

        Ok(Self {
            store: Arc::new(PostgresOutboxStore::new(pool.clone())),
            processed: Arc::new(processed),
            errors: Arc::new(errors),
            pool,
        })
    }
}

/// Bootstrap the store. Safe to run repeatedly.
pub async fn setup(config: &AppConfig) -> anyhow::Result<()> {
    info!(database = %config.database.name, "Setting up database");

    if ensure_database(&config.database).await? {
        info!(database = %config.database.name, "✓ Database created");
    } else {
        info!(database = %config.database.name, "✓ Database already exists");
    }

    let pool = connect_to_database(config).await?;
    ensure_tables(&pool).await?;
    info!("✓ Tables ready");

    if config.capture.mode == CaptureMode::Replication {
        let slot = replication_slot(config, &pool);
        slot.ensure_slot().await?;
        slot.ensure_publication().await?;
        info!(
            slot = %config.replication.slot_name,
            publication = %config.replication.publication_name,
            "✓ Replication slot and publication ready"
        );
    }

    pool.close().await;
    info!("Setup complete");
    Ok(())
}

/// Serve the HTTP API and run the capture session until a signal arrives.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!(version = APP_VERSION, mode = %config.capture.mode, "Starting outbox relay server");

    let state = AppState::open(&config).await?;
    let shutdown = GracefulShutdown::new(ShutdownConfig::default());
    start_signal_handler(&shutdown);

    let session = spawn_session(&config, &state, &shutdown).await?;

    let router = api_router(ApiState::new(
        state.store.clone() as Arc<dyn TransactionalWriter>,
        state.store.clone() as Arc<dyn OutboxStore>,
        state.processed.clone() as Arc<dyn ProcessedLog>,
    ));
    let addr = config.http.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "✓ HTTP API listening");

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            server_shutdown.wait_for_signal().await;
        })
        .await;
    shutdown.shutdown(ShutdownReason::Programmatic("HTTP server stopped".to_string()));

    let (metrics, session_result) =
        session_outcome(drain(&shutdown, "capture-session", session).await);
    finish(state, metrics).await;

    served.context("HTTP server failed")?;
    session_result
}

/// Run only the capture session until a signal arrives or it fails.
pub async fn relay(config: AppConfig) -> anyhow::Result<()> {
    info!(version = APP_VERSION, mode = %config.capture.mode, "Starting outbox relay");

    let state = AppState::open(&config).await?;
    let shutdown = GracefulShutdown::new(ShutdownConfig::default());
    start_signal_handler(&shutdown);

    let session = spawn_session(&config, &state, &shutdown).await?;
    let reason = shutdown.wait_for_signal().await;
    info!(reason = %reason, "Stopping relay");

    let (metrics, session_result) =
        session_outcome(drain(&shutdown, "capture-session", session).await);
    finish(state, metrics).await;
    session_result
}

/// Build the configured source and run a capture session on its own task.
///
/// A session failure also triggers shutdown of the whole process.
async fn spawn_session(
    config: &AppConfig,
    state: &AppState,
    shutdown: &GracefulShutdown,
) -> anyhow::Result<JoinHandle<Result<CaptureMetrics, CaptureError>>> {
    let (source, outbox_table) = build_source(config, state).await?;

    let processor = MessageProcessor::new(
        state.store.clone() as Arc<dyn OutboxStore>,
        state.processed.clone() as Arc<dyn ProcessedLog>,
    )
    .with_outbox_table(outbox_table);

    let session = CaptureSession::new(
        source,
        Arc::new(processor),
        state.errors.clone() as Arc<dyn ErrorSink>,
        config.capture.session_config(),
        shutdown.subscribe(),
    );

    let shutdown = shutdown.clone();
    Ok(tokio::spawn(async move {
        let result = session.run().await;
        if let Err(e) = &result {
            error!(error = %e, "Capture session failed");
            shutdown.shutdown(ShutdownReason::Programmatic(format!(
                "capture session failed: {}",
                e
            )));
        }
        result
    }))
}

/// Split a drained session into its final metrics and the process result.
///
/// A session that failed makes the process fail; one that was aborted on
/// timeout or panicked has already been reported by `drain`.
fn session_outcome(
    drained: Option<Result<CaptureMetrics, CaptureError>>,
) -> (Option<CaptureMetrics>, anyhow::Result<()>) {
    match drained {
        Some(Ok(metrics)) => (Some(metrics), Ok(())),
        Some(Err(e)) => (
            None,
            Err(anyhow::Error::new(e).context("Capture session stopped with an error")),
        ),
        None => (None, Ok(())),
    }
}

async fn build_source(
    config: &AppConfig,
    state: &AppState,
) -> anyhow::Result<(Box<dyn ChangeCaptureSource>, String)> {
    match config.capture.mode {
        CaptureMode::Replication => {
            let slot = Arc::new(replication_slot(config, &state.pool));
            let source = LogReplicationSource::new(slot, &config.replication);
            Ok((Box::new(source), config.replication.outbox_table.clone()))
        }
        CaptureMode::Polled => {
            let source = polled_source(config, state.errors.clone()).await?;
            Ok((source, OUTBOX_TABLE.to_string()))
        }
    }
}

#[cfg(feature = "kinesis")]
async fn polled_source(
    config: &AppConfig,
    errors: Arc<FileErrorSink>,
) -> anyhow::Result<Box<dyn ChangeCaptureSource>> {
    use outbox_relay_infrastructure::capture::polled::{KinesisStreamClient, PolledStreamSource};

    let client = KinesisStreamClient::from_region(&config.stream.region).await;
    let source = PolledStreamSource::new(Arc::new(client), &config.stream, OUTBOX_TABLE)
        .with_error_sink(errors);
    Ok(Box::new(source))
}

#[cfg(not(feature = "kinesis"))]
async fn polled_source(
    _config: &AppConfig,
    _errors: Arc<FileErrorSink>,
) -> anyhow::Result<Box<dyn ChangeCaptureSource>> {
    anyhow::bail!("Polled capture requires building with the `kinesis` feature")
}

fn replication_slot(config: &AppConfig, pool: &PgPool) -> PgReplicationSlot {
    PgReplicationSlot::new(
        pool.clone(),
        &config.replication.slot_name,
        &config.replication.publication_name,
        &config.replication.outbox_table,
    )
}

async fn finish(state: AppState, metrics: Option<CaptureMetrics>) {
    if let Some(metrics) = metrics {
        info!(
            batches = metrics.batches_fetched,
            recorded = metrics.records_recorded,
            duplicates = metrics.records_duplicate,
            failed = metrics.records_failed,
            retries = metrics.retries_total,
            "Capture session summary"
        );
    }
    state.pool.close().await;
    info!("Database pool closed");
}

/// Connect to database.
async fn connect_to_database(config: &AppConfig) -> anyhow::Result<PgPool> {
    info!(
        host = %config.database.host,
        port = config.database.port,
        database = %config.database.name,
        "Connecting to database..."
    );
    let pool = connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("✓ Database connected");
    Ok(pool)
}
