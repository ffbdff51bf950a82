//! Rate Limit Configuration
//!
//! Limits for the minute window and the monthly budget.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default rate limits
pub const DEFAULT_MAX_PER_MINUTE: u32 = 20; // requests per window
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_MONTHLY_LIMIT: i64 = 500; // requests per calendar month
pub const DEFAULT_USAGE_KEY_PREFIX: &str = "api:usage:";
pub const DEFAULT_WARNING_THRESHOLD_PERCENT: f64 = 80.0;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls admitted per sliding window
    pub max_per_minute: u32,

    /// Sliding window length in seconds
    pub window_secs: u64,

    /// Calls allowed per calendar month
    pub monthly_limit: i64,

    /// Prefix of the persisted period counter key
    pub usage_key_prefix: String,

    /// Monthly usage percentage above which the snapshot raises a warning
    pub warning_threshold_percent: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: DEFAULT_MAX_PER_MINUTE,
            window_secs: DEFAULT_WINDOW_SECS,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            usage_key_prefix: DEFAULT_USAGE_KEY_PREFIX.to_string(),
            warning_threshold_percent: DEFAULT_WARNING_THRESHOLD_PERCENT,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `QUOTAGUARD_*` environment overrides
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("QUOTAGUARD_MAX_PER_MINUTE") {
            if let Ok(limit) = val.parse() {
                self.max_per_minute = limit;
            }
        }

        if let Ok(val) = std::env::var("QUOTAGUARD_WINDOW_SECS") {
            if let Ok(secs) = val.parse() {
                self.window_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("QUOTAGUARD_MONTHLY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.monthly_limit = limit;
            }
        }

        if let Ok(prefix) = std::env::var("QUOTAGUARD_USAGE_KEY_PREFIX") {
            self.usage_key_prefix = prefix;
        }

        self
    }

    /// Sliding window length
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Check the limits are usable
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_per_minute == 0 {
            anyhow::bail!("max_per_minute must be > 0");
        }
        if self.window_secs == 0 {
            anyhow::bail!("window_secs must be > 0");
        }
        if self.monthly_limit <= 0 {
            anyhow::bail!("monthly_limit must be > 0");
        }
        if self.usage_key_prefix.is_empty() {
            anyhow::bail!("usage_key_prefix must not be empty");
        }
        if !(0.0..=100.0).contains(&self.warning_threshold_percent) {
            anyhow::bail!("warning_threshold_percent must be between 0 and 100");
        }
        Ok(())
    }
}
