//! Period Budget
//!
//! Counts successful upstream calls per calendar month (UTC) in a shared
//! counter store. The counter key is `<prefix>YYYY-MM`, so a new month starts
//! from zero without any reset job. Each increment pushes the key's expiry to
//! the first day of the month after next, keeping the live counter well
//! clear of its own expiry.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::config::RateLimitConfig;
use super::store::CounterStore;
use crate::clock::Clock;
use crate::error::StoreResult;

/// Period identifier for `now`, e.g. `2024-11`
pub fn period_id(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Unix timestamp of midnight UTC on the first day `months` months after
/// the month containing `now`
pub fn month_start_after(now: DateTime<Utc>, months: u32) -> i64 {
    let total = now.year() * 12 + now.month0() as i32 + months as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
        // Only reachable at the edge of chrono's year range
        .unwrap_or_else(|| now.timestamp() + 62 * 24 * 60 * 60)
}

/// Expiry for the counter of the period containing `now`
pub fn counter_expiry(now: DateTime<Utc>) -> i64 {
    month_start_after(now, 2)
}

/// Persistent monthly call budget
#[derive(Clone)]
pub struct PeriodBudget {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    limit: i64,
    key_prefix: String,
}

impl fmt::Debug for PeriodBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodBudget")
            .field("limit", &self.limit)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl PeriodBudget {
    /// Create a budget of `limit` calls per month
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, limit: i64) -> Self {
        Self {
            store,
            clock,
            limit,
            key_prefix: super::config::DEFAULT_USAGE_KEY_PREFIX.to_string(),
        }
    }

    /// Create a budget from configuration
    pub fn from_config(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        config: &RateLimitConfig,
    ) -> Self {
        Self::new(store, clock, config.monthly_limit).with_key_prefix(&config.usage_key_prefix)
    }

    /// Use a different counter key prefix
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    /// Calls allowed per period
    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Counter key for the current period
    pub fn current_key(&self) -> String {
        format!("{}{}", self.key_prefix, period_id(self.clock.now()))
    }

    /// Count one call against the current period
    pub async fn increment(&self) -> StoreResult<i64> {
        let now = self.clock.now();
        let key = format!("{}{}", self.key_prefix, period_id(now));
        self.store.incr_and_expire_at(&key, counter_expiry(now)).await
    }

    /// Calls counted so far this period
    pub async fn current_usage(&self) -> StoreResult<i64> {
        Ok(self.store.get(&self.current_key()).await?.unwrap_or(0))
    }

    /// Calls left this period; negative once the limit has been overrun
    pub async fn remaining(&self) -> StoreResult<i64> {
        Ok(self.limit - self.current_usage().await?)
    }

    /// Whether another call fits in this period
    pub async fn has_remaining(&self) -> StoreResult<bool> {
        Ok(self.current_usage().await? < self.limit)
    }

    /// Usage as a percentage of the limit
    pub async fn usage_percentage(&self) -> StoreResult<f64> {
        Ok(usage_percent(self.current_usage().await?, self.limit))
    }

    /// Clear the current period's counter
    pub async fn reset(&self) -> StoreResult<()> {
        let key = self.current_key();
        self.store.delete(&key).await?;
        info!(key = %key, "Reset monthly usage counter");
        Ok(())
    }
}

/// `used` as a percentage of `limit`
pub fn usage_percent(used: i64, limit: i64) -> f64 {
    if limit <= 0 {
        0.0
    } else {
        used as f64 * 100.0 / limit as f64
    }
}
