//! Usage Reporter
//!
//! Read-only view of the minute window and monthly budget for operators and
//! API clients. Never mutates counters beyond pruning stale window entries.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::budget::usage_percent;
use super::config::DEFAULT_WARNING_THRESHOLD_PERCENT;
use super::gate::AccessGate;
use crate::error::StoreResult;

/// Point-in-time usage figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    /// Calls counted this month
    pub monthly_used: i64,

    /// Calls allowed per month
    pub monthly_limit: i64,

    /// Calls left this month (negative once overrun)
    pub monthly_remaining: i64,

    /// Monthly usage as a percentage of the limit
    pub monthly_percentage: f64,

    /// Calls in the current minute window
    pub minute_used: u32,

    /// Calls allowed per minute window
    pub minute_limit: u32,

    /// Calls left in the current minute window
    pub minute_remaining: u32,

    /// Monthly usage has crossed the warning threshold
    pub warning_level: bool,
}

impl UsageSnapshot {
    /// Snapshot with zero usage, returned when figures cannot be read
    pub fn fallback(monthly_limit: i64, minute_limit: u32) -> Self {
        Self {
            monthly_used: 0,
            monthly_limit,
            monthly_remaining: monthly_limit,
            monthly_percentage: 0.0,
            minute_used: 0,
            minute_limit,
            minute_remaining: minute_limit,
            warning_level: false,
        }
    }
}

/// Builds usage snapshots from a gate
#[derive(Debug, Clone)]
pub struct UsageReporter {
    gate: AccessGate,
    warning_threshold_percent: f64,
}

impl UsageReporter {
    /// Create a reporter for `gate`
    pub fn new(gate: AccessGate) -> Self {
        Self {
            gate,
            warning_threshold_percent: DEFAULT_WARNING_THRESHOLD_PERCENT,
        }
    }

    /// Warn above `percent` monthly usage instead of the default 80%
    pub fn with_warning_threshold(mut self, percent: f64) -> Self {
        self.warning_threshold_percent = percent;
        self
    }

    /// Usage as of `now` (Unix seconds)
    ///
    /// Falls back to a zero-usage snapshot if the budget store fails.
    pub async fn snapshot(&self, now: u64) -> UsageSnapshot {
        match self.try_snapshot(now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to read usage, returning fallback snapshot");
                UsageSnapshot::fallback(
                    self.gate.budget().limit(),
                    self.gate.limiter().max_per_window(),
                )
            }
        }
    }

    async fn try_snapshot(&self, now: u64) -> StoreResult<UsageSnapshot> {
        let budget = self.gate.budget();
        let monthly_used = budget.current_usage().await?;
        let monthly_limit = budget.limit();
        let monthly_percentage = usage_percent(monthly_used, monthly_limit);

        let limiter = self.gate.limiter();
        let minute_used = limiter.current_count(now);
        let minute_limit = limiter.max_per_window();

        Ok(UsageSnapshot {
            monthly_used,
            monthly_limit,
            monthly_remaining: monthly_limit - monthly_used,
            monthly_percentage,
            minute_used,
            minute_limit,
            minute_remaining: minute_limit.saturating_sub(minute_used),
            warning_level: monthly_percentage > self.warning_threshold_percent,
        })
    }
}
