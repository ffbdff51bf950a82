//! Guard Error Types
//!
//! `GateError` is what callers of the quote service see. `StoreError` covers
//! the shared counter and cache backends.

use crate::rate_limit::DenialReason;

/// Result alias for backend store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by counter and cache backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis command or connection failure
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Stored value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend cannot serve requests right now
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            StoreError::Serialization(_) => false,
            StoreError::Unavailable(_) => true,
        }
    }
}

/// Errors returned by guarded fetch operations
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Minute window is full
    #[error("Rate limit exceeded. Try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    /// Monthly budget is spent
    #[error("Monthly API budget exhausted ({used}/{limit})")]
    BudgetExhausted { used: i64, limit: i64 },

    /// Upstream answered but had nothing for the symbol
    #[error("No historical data found for {symbol}")]
    NotFound { symbol: String },

    /// Upstream call failed; passed through unchanged
    #[error("API call failed: {0}")]
    Upstream(#[source] anyhow::Error),
}

impl GateError {
    /// Seconds the caller should wait before trying again, if known
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GateError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<DenialReason> for GateError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::RateLimited { retry_after_secs } => GateError::RateLimited { retry_after_secs },
            DenialReason::BudgetExhausted { used, limit } => GateError::BudgetExhausted { used, limit },
        }
    }
}
