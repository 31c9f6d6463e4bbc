//! CaptureSession - the single sequential relay loop
//!
//! ```text
//! start ─▶ ┌──────────────────────────────────────────────────┐
//!          │ stop requested? ──yes──▶ close ─▶ return         │
//!          │ fetch                                            │
//!          │   transient ─▶ backoff sleep (retry counter++)   │
//!          │   fatal     ─▶ close ─▶ return Err               │
//!          │ for each record:                                 │
//!          │   process (failures ─▶ ErrorSink)                │
//!          │   acknowledge(record.position)                   │
//!          │ acknowledge(batch.resume_from)                   │
//!          │ sleep poll_interval (interruptible)              │
//!          └──────────────────────────────────────────────────┘
//! ```
//!
//! Records are processed one at a time in source order. A stop request is
//! honored between records; the record in flight always finishes.

use outbox_relay_domain::capture::{CaptureError, ChangeCaptureSource, ChangeRecord};
use outbox_relay_domain::processing::{ErrorSink, MessageProcessor, ProcessOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::backoff::BackoffConfig;

/// Default pause between polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Loop timing for a capture session
#[derive(Debug, Clone)]
pub struct CaptureSessionConfig {
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
}

impl Default for CaptureSessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Counters collected by the capture session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetrics {
    pub batches_fetched: u64,
    pub records_received: u64,
    pub records_recorded: u64,
    pub records_duplicate: u64,
    pub records_skipped: u64,
    pub records_failed: u64,
    /// Every transient fetch failure since the session started
    pub retries_total: u64,
    /// Transient failures since the last successful fetch
    pub consecutive_retries: u32,
    pub last_error: Option<String>,
}

impl CaptureMetrics {
    fn record_batch(&mut self, size: usize) {
        self.batches_fetched += 1;
        self.records_received += size as u64;
        self.consecutive_retries = 0;
    }

    fn record_outcome(&mut self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Recorded { .. } => self.records_recorded += 1,
            ProcessOutcome::Duplicate { .. } => self.records_duplicate += 1,
            ProcessOutcome::Skipped => self.records_skipped += 1,
        }
    }

    fn record_failed(&mut self) {
        self.records_failed += 1;
    }

    fn record_retry(&mut self, error: &CaptureError) {
        self.retries_total += 1;
        self.consecutive_retries = self.consecutive_retries.saturating_add(1);
        self.last_error = Some(error.to_string());
    }
}

/// Drives one [`ChangeCaptureSource`] through the [`MessageProcessor`]
pub struct CaptureSession {
    source: Box<dyn ChangeCaptureSource>,
    processor: Arc<MessageProcessor>,
    errors: Arc<dyn ErrorSink>,
    config: CaptureSessionConfig,
    metrics: Arc<Mutex<CaptureMetrics>>,
    shutdown: watch::Receiver<bool>,
}

impl CaptureSession {
    /// Create a session.
    ///
    /// The session stops when `true` is sent on the shutdown channel or when
    /// its sender is dropped.
    pub fn new(
        source: Box<dyn ChangeCaptureSource>,
        processor: Arc<MessageProcessor>,
        errors: Arc<dyn ErrorSink>,
        config: CaptureSessionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            processor,
            errors,
            config,
            metrics: Arc::new(Mutex::new(CaptureMetrics::default())),
            shutdown,
        }
    }

    /// Shared handle to the live counters.
    pub fn metrics(&self) -> Arc<Mutex<CaptureMetrics>> {
        self.metrics.clone()
    }

    /// Run until stopped or until the source fails fatally.
    ///
    /// The source is closed before this returns, on every path.
    ///
    /// # Errors
    /// Returns the fatal [`CaptureError`] that ended the session.
    pub async fn run(mut self) -> Result<CaptureMetrics, CaptureError> {
        let kind = self.source.kind();
        info!(
            source = kind,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            backoff = %self.config.backoff,
            "Starting capture session"
        );

        let result = match self.source.start().await {
            Ok(()) => self.run_loop().await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.source.close().await {
            error!(source = kind, error = %e, "Failed to close capture source");
        }

        let metrics = self.metrics.lock().await.clone();
        match result {
            Ok(()) => {
                info!(
                    source = kind,
                    batches = metrics.batches_fetched,
                    recorded = metrics.records_recorded,
                    failed = metrics.records_failed,
                    "Capture session stopped"
                );
                Ok(metrics)
            }
            Err(e) => {
                error!(source = kind, error = %e, "Capture session failed");
                Err(e)
            }
        }
    }

    async fn run_loop(&mut self) -> Result<(), CaptureError> {
        let mut retry: u32 = 0;

        loop {
            if self.stop_requested() {
                return Ok(());
            }

            let batch = match self.source.fetch().await {
                Ok(batch) => batch,
                Err(e) if e.is_transient() => {
                    let delay = self.config.backoff.calculate_delay(retry);
                    retry = retry.saturating_add(1);
                    self.metrics.lock().await.record_retry(&e);
                    warn!(
                        source = self.source.kind(),
                        error = %e,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "Transient fetch error, backing off"
                    );
                    if self.sleep_or_stop(delay).await {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            if retry > 0 {
                info!(source = self.source.kind(), retries = retry, "Fetch recovered");
                retry = 0;
            }
            self.metrics.lock().await.record_batch(batch.len());

            if !batch.is_empty() {
                debug!(source = self.source.kind(), records = batch.len(), "Processing batch");
            }

            for record in &batch.records {
                self.handle_record(record).await;
                self.source.acknowledge(&record.position).await?;
                if self.stop_requested() {
                    return Ok(());
                }
            }

            if let Some(resume_from) = &batch.resume_from {
                self.source.acknowledge(resume_from).await?;
            }

            if self.sleep_or_stop(self.config.poll_interval).await {
                return Ok(());
            }
        }
    }

    async fn handle_record(&mut self, record: &ChangeRecord) {
        match self.processor.process(record).await {
            Ok(outcome) => self.metrics.lock().await.record_outcome(outcome),
            Err(e) => {
                self.metrics.lock().await.record_failed();
                let context = match record.message_id() {
                    Some(id) => format!("Error processing message {}", id),
                    None => format!("Error processing record at {}", record.position),
                };
                self.errors.record(&context, &e).await;
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `delay`; returns `true` if a stop was requested meanwhile.
    async fn sleep_or_stop(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = self.shutdown.changed() => changed.is_err() || *self.shutdown.borrow(),
        }
    }
}
