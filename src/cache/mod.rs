//! Result Cache Module
//!
//! Keeps successful upstream responses for a short, per-class TTL so repeat
//! requests are served without spending rate limit or budget. Failures and
//! empty results are never stored.

pub mod backend;
mod result_cache;

pub use backend::{CacheBackend, MemoryCacheBackend, RedisCacheBackend};
pub use result_cache::{ResultCache, DEFAULT_CACHE_KEY_PREFIX};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default TTL for batch quotes
pub const DEFAULT_QUOTES_TTL_SECS: u64 = 120;

/// Default TTL for historical series
pub const DEFAULT_HISTORY_TTL_SECS: u64 = 300;

/// Kind of cached result; each class has its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheClass {
    /// Batch quotes for the configured symbols
    Quotes,

    /// Daily time series for one symbol
    History,
}

impl CacheClass {
    /// Name used in cache keys and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheClass::Quotes => "quotes",
            CacheClass::History => "history",
        }
    }

    /// TTL applied when no override is configured
    pub fn default_ttl(&self) -> Duration {
        match self {
            CacheClass::Quotes => Duration::from_secs(DEFAULT_QUOTES_TTL_SECS),
            CacheClass::History => Duration::from_secs(DEFAULT_HISTORY_TTL_SECS),
        }
    }
}

impl fmt::Display for CacheClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
