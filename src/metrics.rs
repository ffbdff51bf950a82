// Prometheus metrics for the quota guard
//
// Exposed on the /metrics endpoint by `metrics_server`:
// - Gate admissions by outcome (counter)
// - Cache lookups by class and result (counter)
// - Upstream requests by endpoint and status (counter)
// - Lost budget increments (counter)
// - Monthly usage as last seen (gauge)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref GATE_ADMISSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("gate_admissions_total", "Admission decisions by outcome"),
        &["outcome"]
    ).expect("Failed to create gate admissions metric");

    pub static ref CACHE_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("cache_lookups_total", "Result cache lookups"),
        &["class", "result"]
    ).expect("Failed to create cache lookups metric");

    pub static ref UPSTREAM_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("upstream_requests_total", "Requests sent to the market-data API"),
        &["endpoint", "status"]
    ).expect("Failed to create upstream requests metric");

    pub static ref BUDGET_WRITE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "budget_write_failures_total",
        "Successful upstream calls that could not be counted against the monthly budget"
    ).expect("Failed to create budget write failures metric");

    pub static ref MONTHLY_USAGE: IntGauge = IntGauge::new(
        "monthly_usage",
        "Upstream calls counted in the current month"
    ).expect("Failed to create monthly usage metric");
}

/// Register all metrics with the registry
///
/// Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(GATE_ADMISSIONS_TOTAL.clone()),
        Box::new(CACHE_LOOKUPS_TOTAL.clone()),
        Box::new(UPSTREAM_REQUESTS_TOTAL.clone()),
        Box::new(BUDGET_WRITE_FAILURES_TOTAL.clone()),
        Box::new(MONTHLY_USAGE.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Count an admission decision
pub fn record_admission(outcome: &str) {
    GATE_ADMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Count a cache lookup
pub fn record_cache_lookup(class: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL.with_label_values(&[class, result]).inc();
}

/// Count an upstream request
pub fn record_upstream_request(endpoint: &str, status: &str) {
    UPSTREAM_REQUESTS_TOTAL
        .with_label_values(&[endpoint, status])
        .inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
