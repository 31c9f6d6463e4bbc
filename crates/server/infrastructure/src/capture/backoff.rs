//! BackoffConfig - capped exponential backoff for transient capture failures
//!
//! ```text
//! Retry    Delay (base=500ms, max=30s)    With jitter (±10%)
//! ──────────────────────────────────────────────────────────
//!   0            500ms                     450ms - 550ms
//!   1              1s                      0.9s - 1.1s
//!   2              2s                      1.8s - 2.2s
//!   ...
//!   6+            30s                      27s - 33s
//! ```
//!
//! There is no retry limit: a transient failure is retried until it clears or
//! the session is asked to stop.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default base delay in milliseconds
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default max delay in milliseconds (30 seconds)
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default jitter factor (10%)
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Exponential backoff settings for the capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry (default: 500ms)
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay (default: 30s)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Jitter as a fraction of the delay (0.0-1.0, default: 0.1 = ±10%)
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

fn default_base_delay() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_delay() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

fn default_jitter() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl fmt::Display for BackoffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BackoffConfig(base_delay={}ms, max_delay={}ms, jitter={:.1}%)",
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor * 100.0
        )
    }
}

impl BackoffConfig {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, jitter_factor: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Short delays for tests and local runs: 10ms base, 100ms max, no jitter.
    pub fn fast() -> Self {
        Self::new(10, 100, 0.0)
    }

    /// The capped delay for a retry attempt, before jitter.
    ///
    /// `min(base * 2^retry, max)`
    pub fn capped_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Delay before retry attempt `retry` (0-indexed), with jitter applied.
    ///
    /// Jitter never pushes the delay above `max_delay_ms`.
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let delay = self.capped_delay(retry).as_millis() as u64;

        let jitter_range = (delay as f64 * self.jitter_factor) as i64;
        let jitter = if jitter_range > 0 {
            let mut rng = rand::thread_rng();
            rng.gen_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        let jittered = (delay as i64 + jitter).max(0) as u64;
        Duration::from_millis(jittered.min(self.max_delay_ms))
    }
}
