//! QuotaGuard Library
//!
//! Guard layer in front of a metered market-data API: a per-minute sliding
//! window, a persistent calendar-month budget, a short-lived result cache and
//! a read-only usage report.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod metrics_server;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod upstream;

pub use error::{GateError, StoreError};
pub use service::QuoteService;
