//! Graceful Shutdown Module
//!
//! Coordinates shutdown of the HTTP server and the capture session:
//! - Signal handlers (SIGTERM, SIGINT)
//! - A stop flag the capture session polls between records
//! - Bounded wait for the session to drain

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Shutdown configuration
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for the capture session to stop
    pub timeout: Duration,
    /// Enable signal handlers
    pub enable_signals: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            enable_signals: true,
        }
    }
}

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct GracefulShutdown {
    /// Stop flag observed by background tasks
    stop_tx: Arc<watch::Sender<bool>>,
    state_tx: Arc<watch::Sender<ShutdownState>>,
    config: Arc<ShutdownConfig>,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(ShutdownState::Running);

        Self {
            stop_tx: Arc::new(stop_tx),
            state_tx: Arc::new(state_tx),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    /// Stop flag for a background task; flips to `true` on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Trigger shutdown programmatically
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.is_shutting_down() {
            return;
        }
        info!(reason = %reason, "Triggering shutdown");
        self.state_tx.send_replace(ShutdownState::ShuttingDown(reason));
        self.stop_tx.send_replace(true);
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait_for_signal(&self) -> ShutdownReason {
        let mut rx = self.state_tx.subscribe();
        loop {
            if let ShutdownState::ShuttingDown(reason) = &*rx.borrow_and_update() {
                return reason.clone();
            }
            if rx.changed().await.is_err() {
                return ShutdownReason::Unknown;
            }
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state_tx.borrow().clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(*self.state_tx.borrow(), ShutdownState::ShuttingDown(_))
    }
}

/// Reason for shutdown
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// SIGTERM signal received
    SigTerm,
    /// SIGINT signal received (Ctrl+C)
    SigInt,
    /// A component stopped on its own
    Programmatic(String),
    Unknown,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::SigTerm => write!(f, "SIGTERM"),
            ShutdownReason::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            ShutdownReason::Programmatic(reason) => write!(f, "Programmatic: {}", reason),
            ShutdownReason::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownState {
    Running,
    ShuttingDown(ShutdownReason),
}

/// Wait for a background task to finish, up to the configured timeout.
///
/// Returns `None` if the task panicked or did not stop in time; in the
/// latter case it is aborted.
pub async fn drain<T>(
    coordinator: &GracefulShutdown,
    name: &str,
    mut handle: JoinHandle<T>,
) -> Option<T> {
    match timeout(coordinator.config.timeout, &mut handle).await {
        Ok(Ok(value)) => {
            info!(task = name, "Task stopped");
            Some(value)
        }
        Ok(Err(e)) => {
            error!(task = name, error = %e, "Task panicked");
            None
        }
        Err(_) => {
            warn!(
                task = name,
                timeout = ?coordinator.config.timeout,
                "Task did not stop in time, aborting"
            );
            handle.abort();
            None
        }
    }
}

/// Start signal handler that triggers graceful shutdown
pub fn start_signal_handler(coordinator: &GracefulShutdown) {
    if !coordinator.config.enable_signals {
        return;
    }

    let coordinator = coordinator.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            match signal::ctrl_c().await {
                Ok(()) => ShutdownReason::SigInt,
                Err(e) => {
                    error!("Failed to register ctrl-c handler: {}", e);
                    std::future::pending().await
                }
            }
        };

        #[cfg(unix)]
        let term = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    ShutdownReason::SigTerm
                }
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    std::future::pending().await
                }
            }
        };
        #[cfg(not(unix))]
        let term = std::future::pending::<ShutdownReason>();

        tokio::select! {
            reason = ctrl_c => coordinator.shutdown(reason),
            reason = term => coordinator.shutdown(reason),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_trigger() {
        let shutdown = GracefulShutdown::new(ShutdownConfig::default());

        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.wait_for_signal().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.shutdown(ShutdownReason::Programmatic("Test".to_string()));

        let reason = handle.await.unwrap();
        assert!(matches!(reason, ShutdownReason::Programmatic(_)));
    }

    #[tokio::test]
    async fn test_shutdown_state() {
        let shutdown = GracefulShutdown::new(ShutdownConfig::default());
        let stop = shutdown.subscribe();

        assert!(!shutdown.is_shutting_down());
        assert_eq!(shutdown.state(), ShutdownState::Running);
        assert!(!*stop.borrow());

        shutdown.shutdown(ShutdownReason::SigInt);
        shutdown.shutdown(ShutdownReason::SigTerm);

        assert_eq!(
            shutdown.state(),
            ShutdownState::ShuttingDown(ShutdownReason::SigInt)
        );
        assert!(*stop.borrow());
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let shutdown = GracefulShutdown::new(ShutdownConfig::default());
        shutdown.shutdown(ShutdownReason::SigTerm);
        assert_eq!(shutdown.wait_for_signal().await, ShutdownReason::SigTerm);
    }

    #[tokio::test]
    async fn test_drain_aborts_stuck_task() {
        let shutdown = GracefulShutdown::new(ShutdownConfig {
            timeout: Duration::from_millis(20),
            enable_signals: false,
        });
        let stuck = tokio::spawn(std::future::pending::<()>());
        assert!(drain(&shutdown, "stuck", stuck).await.is_none());

        let done = tokio::spawn(async { 7 });
        assert_eq!(drain(&shutdown, "done", done).await, Some(7));
    }
}
