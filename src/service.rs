//! Quote Service
//!
//! Composes the result cache, access gate and upstream client. Every fetch
//! follows the same order: serve from cache if possible, otherwise ask the
//! gate, call upstream, count the call and cache the result.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::cache::{CacheBackend, CacheClass, MemoryCacheBackend, RedisCacheBackend, ResultCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::GateError;
use crate::rate_limit::{
    AccessGate, Admission, CounterStore, MemoryCounterStore, PeriodBudget, RedisCounterStore,
    SlidingWindowLimiter, UsageReporter, UsageSnapshot,
};
use crate::upstream::{TwelveDataClient, Upstream};

/// Cache fingerprint for the batch quote call
const QUOTES_FINGERPRINT: &str = "all";

/// Guarded access to quotes and history
#[derive(Clone)]
pub struct QuoteService {
    gate: AccessGate,
    reporter: UsageReporter,
    cache: ResultCache,
    upstream: Arc<dyn Upstream>,
    clock: Arc<dyn Clock>,
    symbols: Vec<String>,
    history_interval: String,
    history_output_size: u32,
}

impl QuoteService {
    /// Create a service with the default symbols and history window
    pub fn new(
        gate: AccessGate,
        cache: ResultCache,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let defaults = crate::config::UpstreamConfig::default();
        Self {
            reporter: UsageReporter::new(gate.clone()),
            gate,
            cache,
            upstream,
            clock,
            symbols: defaults.symbols,
            history_interval: defaults.history_interval,
            history_output_size: defaults.history_output_size,
        }
    }

    /// Wire up stores, cache and HTTP client from configuration
    ///
    /// Uses Redis when `storage.redis_url` is set, process memory otherwise.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let counters: Arc<dyn CounterStore>;
        let backend: Arc<dyn CacheBackend>;
        match &config.storage.redis_url {
            Some(url) => {
                counters = Arc::new(
                    RedisCounterStore::connect(url)
                        .await
                        .with_context(|| format!("Failed to connect to Redis at {}", url))?,
                );
                backend = Arc::new(
                    RedisCacheBackend::connect(url)
                        .await
                        .with_context(|| format!("Failed to connect to Redis at {}", url))?,
                );
                info!("Using Redis for usage counters and result cache");
            }
            None => {
                counters = Arc::new(MemoryCounterStore::new(Arc::clone(&clock)));
                backend = Arc::new(MemoryCacheBackend::new(Arc::clone(&clock)));
                info!("No Redis URL configured, usage counters will not survive restarts");
            }
        }

        let limiter = SlidingWindowLimiter::from_config(&config.limits);
        let budget = PeriodBudget::from_config(counters, Arc::clone(&clock), &config.limits);
        let gate = AccessGate::new(limiter, budget);
        let cache = ResultCache::from_config(backend, &config.cache);
        let upstream = Arc::new(TwelveDataClient::new(&config.upstream)?);

        Ok(Self::new(gate, cache, upstream, clock)
            .with_symbols(config.upstream.symbols.clone())
            .with_history_window(&config.upstream.history_interval, config.upstream.history_output_size)
            .with_warning_threshold(config.limits.warning_threshold_percent))
    }

    /// Symbols fetched by [`fetch_quotes`](Self::fetch_quotes)
    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    /// Interval and length of historical series
    pub fn with_history_window(mut self, interval: &str, output_size: u32) -> Self {
        self.history_interval = interval.to_string();
        self.history_output_size = output_size;
        self
    }

    /// Monthly usage percentage above which snapshots warn
    pub fn with_warning_threshold(mut self, percent: f64) -> Self {
        self.reporter = UsageReporter::new(self.gate.clone()).with_warning_threshold(percent);
        self
    }

    /// The gate guarding upstream calls
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    async fn admit(&self) -> Result<(), GateError> {
        match self.gate.try_admit(self.clock.epoch_secs()).await {
            Admission::Allowed => Ok(()),
            Admission::Denied(reason) => Err(reason.into()),
        }
    }

    /// Log a completed fetch; `counted` is false when the budget write was lost
    async fn log_usage(&self, what: &str, counted: bool) {
        let usage = self.usage_snapshot().await;
        info!("Successfully fetched {}. {}", what, usage_summary(&usage, counted));
    }

    /// Latest quotes for the configured symbols
    pub async fn fetch_quotes(&self) -> Result<Value, GateError> {
        if let Some(cached) = self.cache.get(CacheClass::Quotes, QUOTES_FINGERPRINT).await {
            return Ok(cached);
        }

        self.admit().await?;

        let quotes = self.upstream.quotes(&self.symbols).await.map_err(|e| {
            error!(error = %format!("{:#}", e), "Failed to fetch quotes");
            GateError::Upstream(e)
        })?;

        let counted = self.gate.record_success().await;
        self.cache
            .put(CacheClass::Quotes, QUOTES_FINGERPRINT, &quotes, None)
            .await;
        self.log_usage("prices", counted).await;

        Ok(quotes)
    }

    /// Daily history for `symbol`
    ///
    /// URL-safe symbols use `-` for `/` (`BTC-USD` is `BTC/USD`). An upstream
    /// answer without data points is reported as not found and not cached.
    pub async fn fetch_history(&self, symbol: &str) -> Result<Value, GateError> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(GateError::NotFound { symbol });
        }

        if let Some(cached) = self.cache.get(CacheClass::History, &symbol).await {
            return Ok(cached);
        }

        self.admit().await?;

        let history = self
            .upstream
            .time_series(&symbol, &self.history_interval, self.history_output_size)
            .await
            .map_err(|e| {
                error!(symbol = %symbol, error = %format!("{:#}", e), "Failed to fetch history");
                GateError::Upstream(e)
            })?;

        // The call reached upstream, so it counts even if it came back empty
        let counted = self.gate.record_success().await;

        if !has_data_points(&history) {
            return Err(GateError::NotFound { symbol });
        }

        self.cache.put(CacheClass::History, &symbol, &history, None).await;
        self.log_usage(&format!("history for {}", symbol), counted).await;

        Ok(history)
    }

    /// Current usage figures; never fails
    pub async fn usage_snapshot(&self) -> UsageSnapshot {
        self.reporter.snapshot(self.clock.epoch_secs()).await
    }
}

/// Map a URL-safe symbol back to upstream form
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().replace('-', "/")
}

/// Usage figures for the post-fetch log line
///
/// The monthly count is reported as unknown when the increment for the call
/// just made could not be persisted.
fn usage_summary(usage: &UsageSnapshot, counted: bool) -> String {
    let monthly_used = if counted {
        usage.monthly_used.to_string()
    } else {
        "unknown".to_string()
    };
    format!(
        "Monthly usage: {}/{}, Minute remaining: {}/{}",
        monthly_used, usage.monthly_limit, usage.minute_remaining, usage.minute_limit
    )
}

/// Whether a time-series response carries at least one bar
fn has_data_points(series: &Value) -> bool {
    match series.get("values") {
        Some(Value::Array(values)) => !values.is_empty(),
        Some(Value::Null) => false,
        Some(_) => true,
        None => !series.is_null() && series.as_object().is_some_and(|o| !o.is_empty()),
    }
}
