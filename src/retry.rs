//! Retry Logic
//!
//! Exponential backoff with jitter for transient store failures. Used when
//! recording a successful upstream call against the monthly budget, where a
//! lost increment would silently undercount usage.
//!
//! # Example
//!
//! ```ignore
//! use quotaguard::retry::{RetryConfig, retry_with_backoff};
//!
//! let config = RetryConfig::default()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(50));
//!
//! let used = retry_with_backoff(&config, || budget.increment()).await?;
//! ```

use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::StoreError;

/// Errors that know whether a retry could help
pub trait Transient {
    /// Whether retrying the same operation may succeed
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// Retry configuration
///
/// * `max_attempts` - attempts including the first one (default: 3)
/// * `base_delay` - delay before the first retry (default: 50ms)
/// * `max_delay` - cap on any single delay (default: 1s)
/// * `jitter` - random variation factor (default: 0.1 = 10%)
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial attempt)
    pub max_attempts: usize,

    /// Base delay before first retry
    pub base_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that tries exactly once
    pub fn no_retry() -> Self {
        Self::default().max_attempts(1)
    }

    /// Set the maximum number of attempts
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the base delay between retries
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter factor, clamped to 0.0..=1.0
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (zero-based)
    ///
    /// `base_delay * 2^attempt`, plus jitter, capped at `max_delay`.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(31) as u32);
        let exponential_delay = self.base_delay.saturating_mul(factor);

        let jitter_range = exponential_delay.mul_f64(self.jitter);
        let jitter_offset = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range.as_secs_f64();
        let jittered_delay =
            exponential_delay.saturating_add(Duration::from_secs_f64(jitter_offset.abs()));

        jittered_delay.min(self.max_delay)
    }
}

/// Retry an operation with exponential backoff
///
/// Permanent errors are returned immediately; transient ones are retried
/// until `max_attempts` is reached, then the last error is returned.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!("Operation succeeded on attempt {}", attempt + 1);
                }
                return Ok(result);
            }
            Err(e) if attempt + 1 < max_attempts && e.is_transient() => {
                let delay = config.calculate_delay(attempt);
                tracing::warn!(
                    "Attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::debug!("Giving up after {} attempts: {}", attempt + 1, e);
                return Err(e);
            }
        }
    }
}
