//! End-to-end behaviour of the guarded quote service against a mock upstream
//! and a mock clock.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use quotaguard::cache::{CacheClass, MemoryCacheBackend, ResultCache};
use quotaguard::clock::{Clock, MockClock};
use quotaguard::rate_limit::{AccessGate, MemoryCounterStore, PeriodBudget, SlidingWindowLimiter};
use quotaguard::retry::RetryConfig;
use quotaguard::{GateError, QuoteService};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upstream that records every call
#[derive(Default)]
struct MockUpstream {
    calls: AtomicUsize,
    fail: AtomicBool,
    empty_history: AtomicBool,
    symbols_seen: Mutex<Vec<String>>,
}

impl MockUpstream {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl quotaguard::upstream::Upstream for MockUpstream {
    async fn quotes(&self, symbols: &[String]) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("upstream returned HTTP 503"));
        }
        Ok(json!({ "symbols": symbols, "n": self.calls() }))
    }

    async fn time_series(&self, symbol: &str, interval: &str, output_size: u32) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.symbols_seen.lock().unwrap().push(symbol.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        if self.empty_history.load(Ordering::SeqCst) {
            return Ok(json!({ "meta": { "symbol": symbol }, "values": [] }));
        }
        Ok(json!({
            "meta": { "symbol": symbol, "interval": interval },
            "values": vec![json!({ "close": "1.0" }); output_size as usize],
        }))
    }
}

struct Harness {
    service: QuoteService,
    cache: ResultCache,
    upstream: Arc<MockUpstream>,
    clock: MockClock,
}

fn harness(monthly_limit: i64) -> Harness {
    let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 11, 5, 12, 0, 0).unwrap());
    let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());

    let counters = Arc::new(MemoryCounterStore::new(Arc::clone(&clock_arc)));
    let budget = PeriodBudget::new(counters, Arc::clone(&clock_arc), monthly_limit);
    let gate = AccessGate::new(SlidingWindowLimiter::new(20, 60), budget).with_retry(
        RetryConfig::new()
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2)),
    );
    let cache = ResultCache::new(Arc::new(MemoryCacheBackend::new(Arc::clone(&clock_arc))));
    let upstream = Arc::new(MockUpstream::default());

    let service = QuoteService::new(gate, cache.clone(), upstream.clone(), clock_arc)
        .with_history_window("1day", 3);

    Harness {
        service,
        cache,
        upstream,
        clock,
    }
}

#[tokio::test]
async fn test_cached_quotes_skip_upstream_and_budget() {
    let h = harness(500);

    let first = h.service.fetch_quotes().await.unwrap();
    let second = h.service.fetch_quotes().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.upstream.calls(), 1);

    let usage = h.service.usage_snapshot().await;
    assert_eq!(usage.monthly_used, 1);
    assert_eq!(usage.minute_used, 1);
}

#[tokio::test]
async fn test_quotes_cache_expires_after_two_minutes() {
    let h = harness(500);

    h.service.fetch_quotes().await.unwrap();
    h.clock.advance(Duration::from_secs(119));
    h.service.fetch_quotes().await.unwrap();
    assert_eq!(h.upstream.calls(), 1);

    h.clock.advance(Duration::from_secs(1));
    h.service.fetch_quotes().await.unwrap();
    assert_eq!(h.upstream.calls(), 2);
}

#[tokio::test]
async fn test_failed_call_not_cached_or_counted() {
    let h = harness(500);
    h.upstream.fail.store(true, Ordering::SeqCst);

    let err = h.service.fetch_quotes().await.unwrap_err();
    assert!(matches!(err, GateError::Upstream(_)));

    h.upstream.fail.store(false, Ordering::SeqCst);
    h.service.fetch_quotes().await.unwrap();

    assert_eq!(h.upstream.calls(), 2);
    let usage = h.service.usage_snapshot().await;
    assert_eq!(usage.monthly_used, 1);
    // Both attempts passed the gate
    assert_eq!(usage.minute_used, 2);
}

#[tokio::test]
async fn test_failed_refresh_does_not_extend_cached_quotes() {
    let h = harness(500);

    let fresh = h.service.fetch_quotes().await.unwrap();

    h.clock.advance(Duration::from_secs(119));
    h.upstream.fail.store(true, Ordering::SeqCst);
    assert_eq!(h.service.fetch_quotes().await.unwrap(), fresh);
    assert_eq!(h.upstream.calls(), 1);

    h.clock.advance(Duration::from_secs(2));
    let err = h.service.fetch_quotes().await.unwrap_err();
    assert!(matches!(err, GateError::Upstream(_)));
    assert_eq!(h.upstream.calls(), 2);

    let cached: Option<Value> = h.cache.get(CacheClass::Quotes, "all").await;
    assert_eq!(cached, None);
}

#[tokio::test]
async fn test_minute_window_denies_twenty_first_call() {
    let h = harness(500);

    for i in 0..20 {
        h.service.fetch_history(&format!("SYM{}", i)).await.unwrap();
    }

    let err = h.service.fetch_history("ONE-MORE").await.unwrap_err();
    match err {
        GateError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 60),
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert_eq!(h.upstream.calls(), 20);

    // Cached symbols are still served while the window is full
    assert!(h.service.fetch_history("SYM3").await.is_ok());

    // Calls exactly one window old still count
    h.clock.advance(Duration::from_secs(60));
    assert!(matches!(
        h.service.fetch_history("ONE-MORE").await,
        Err(GateError::RateLimited { .. })
    ));

    h.clock.advance(Duration::from_secs(1));
    assert!(h.service.fetch_history("ONE-MORE").await.is_ok());
}

#[tokio::test]
async fn test_budget_exhaustion_blocks_upstream() {
    let h = harness(2);

    h.service.fetch_history("SPY").await.unwrap();
    h.service.fetch_history("QQQ").await.unwrap();

    let err = h.service.fetch_history("DIA").await.unwrap_err();
    match err {
        GateError::BudgetExhausted { used, limit } => {
            assert_eq!(used, 2);
            assert_eq!(limit, 2);
        }
        other => panic!("expected budget exhaustion, got {:?}", other),
    }
    assert_eq!(h.upstream.calls(), 2);

    let usage = h.service.usage_snapshot().await;
    assert!(usage.warning_level);
    assert_eq!(usage.monthly_remaining, 0);
}

#[tokio::test]
async fn test_budget_resets_with_new_month() {
    let h = harness(1);
    h.service.fetch_history("SPY").await.unwrap();
    assert!(h.service.fetch_history("QQQ").await.is_err());

    h.clock.set(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
    assert!(h.service.fetch_history("QQQ").await.is_ok());
}

#[tokio::test]
async fn test_history_symbol_normalised() {
    let h = harness(500);

    h.service.fetch_history("BTC-USD").await.unwrap();
    h.service.fetch_history("BTC/USD").await.unwrap();

    assert_eq!(h.upstream.symbols_seen.lock().unwrap().as_slice(), ["BTC/USD"]);
}

#[tokio::test]
async fn test_empty_history_is_not_found_and_not_cached() {
    let h = harness(500);
    h.upstream.empty_history.store(true, Ordering::SeqCst);

    let err = h.service.fetch_history("NOPE").await.unwrap_err();
    assert!(matches!(err, GateError::NotFound { ref symbol } if symbol == "NOPE"));

    h.upstream.empty_history.store(false, Ordering::SeqCst);
    h.service.fetch_history("NOPE").await.unwrap();

    assert_eq!(h.upstream.calls(), 2);
    // The empty answer still cost an upstream call
    assert_eq!(h.service.usage_snapshot().await.monthly_used, 2);
}

#[tokio::test]
async fn test_concurrent_fetches_respect_window() {
    let h = harness(500);

    let tasks: Vec<_> = (0..30)
        .map(|i| {
            let service = h.service.clone();
            tokio::spawn(async move { service.fetch_history(&format!("C{}", i)).await })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    let ok = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(ok, 20);
    assert_eq!(h.upstream.calls(), 20);
    assert_eq!(h.service.usage_snapshot().await.monthly_used, 20);
}
