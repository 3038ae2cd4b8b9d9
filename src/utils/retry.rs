//! Retry policy with bounded exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay, including server hints.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Backoff multiplier (delay *= multiplier after each retry).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Backoff before attempt `attempt + 1`, ignoring jitter and server hints.
    ///
    /// `attempt` is 1-based: `delay_for(1)` is the wait after the first failure.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // `min` discards NaN; `max` clears negatives.
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    /// Reject settings that cannot produce a usable schedule.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "retry multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            ));
        }
        Ok(())
    }

    /// Wait before attempt `attempt + 1`: backoff or server hint, plus jitter,
    /// never above `max_delay`.
    fn wait_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let backoff = self.delay_for(attempt);
        let base = hint.map_or(backoff, |hint| hint.max(backoff));
        (base + jitter(base / 4)).min(self.max_delay)
    }
}

/// Tagged outcome of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// Operation succeeded, possibly after retries.
    Success { value: T, attempts: u32 },
    /// Operation failed with a fatal error or after exhausting all attempts.
    Failed { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Convert to a Result, discarding retry information.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Failed { last_error, .. } => Err(last_error),
        }
    }
}

/// Determines if an error is worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Minimum wait the remote side asked for, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Run `operation` until it succeeds, fails fatally, or runs out of attempts.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return RetryOutcome::Success { value, attempts },
            Err(error) => {
                if attempts >= max_attempts || !error.is_retryable() {
                    return RetryOutcome::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                let delay = policy.wait_for(attempts, error.retry_after());

                warn!(
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after error: {error}"
                );
                sleep(delay).await;
            }
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    // Clock-derived; only needs to spread retries, not be random.
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    Duration::from_millis(seed % max_ms)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
