use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::CacheClass;
use crate::config::CacheConfig;
use crate::metrics;

/// Default prefix for result cache keys
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "cache:";

/// Typed, TTL-bounded cache of upstream results
///
/// Values are stored as JSON. A value that serializes to `null` is refused.
/// Backend failures never surface to callers: reads degrade to a miss and
/// writes are logged and dropped.
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    key_prefix: String,
    quotes_ttl: Duration,
    history_ttl: Duration,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("backend", &self.backend)
            .field("key_prefix", &self.key_prefix)
            .field("quotes_ttl", &self.quotes_ttl)
            .field("history_ttl", &self.history_ttl)
            .finish()
    }
}

impl ResultCache {
    /// Create a cache with the default TTLs
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
            quotes_ttl: CacheClass::Quotes.default_ttl(),
            history_ttl: CacheClass::History.default_ttl(),
        }
    }

    /// Create a cache from configuration
    pub fn from_config(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self::new(backend)
            .with_key_prefix(&config.key_prefix)
            .with_ttl(CacheClass::Quotes, Duration::from_secs(config.quotes_ttl_secs))
            .with_ttl(CacheClass::History, Duration::from_secs(config.history_ttl_secs))
    }

    /// Use a different key prefix
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    /// Override the default TTL of `class`
    pub fn with_ttl(mut self, class: CacheClass, ttl: Duration) -> Self {
        match class {
            CacheClass::Quotes => self.quotes_ttl = ttl,
            CacheClass::History => self.history_ttl = ttl,
        }
        self
    }

    /// TTL used for `class` when `put` is given none
    pub fn default_ttl(&self, class: CacheClass) -> Duration {
        match class {
            CacheClass::Quotes => self.quotes_ttl,
            CacheClass::History => self.history_ttl,
        }
    }

    /// Backend key for `fingerprint` in `class`
    pub fn key(&self, class: CacheClass, fingerprint: &str) -> String {
        format!("{}{}:{}", self.key_prefix, class, fingerprint)
    }

    /// Cached value, if present, unexpired and decodable
    pub async fn get<T: DeserializeOwned>(&self, class: CacheClass, fingerprint: &str) -> Option<T> {
        let key = self.key(class, fingerprint);

        let raw = match self.backend.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        };

        let value = raw.and_then(|body| match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        });

        metrics::record_cache_lookup(class.as_str(), value.is_some());
        debug!(key = %key, hit = value.is_some(), "Cache lookup");
        value
    }

    /// Store `value` for `ttl`, or the class default when `None`
    ///
    /// Returns whether the value was stored.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        class: CacheClass,
        fingerprint: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let key = self.key(class, fingerprint);

        let body = match serde_json::to_string(value) {
            Ok(body) => body,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode value for cache");
                return false;
            }
        };

        if body == "null" {
            debug!(key = %key, "Not caching null result");
            return false;
        }

        let ttl = ttl.unwrap_or_else(|| self.default_ttl(class));
        match self.backend.set_with_ttl(&key, body, ttl).await {
            Ok(()) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached result");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCacheBackend;
    use crate::clock::MockClock;
    use crate::error::{StoreError, StoreResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    #[derive(Debug)]
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    fn memory_cache() -> (ResultCache, MockClock) {
        let clock = MockClock::at_epoch_secs(1_000);
        let backend = MemoryCacheBackend::new(Arc::new(clock.clone()));
        (ResultCache::new(Arc::new(backend)), clock)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (cache, _clock) = memory_cache();
        let quotes = json!({"SPY": {"close": "598.19"}});

        assert!(cache.put(CacheClass::Quotes, "all", &quotes, None).await);
        let hit: Option<Value> = cache.get(CacheClass::Quotes, "all").await;
        assert_eq!(hit, Some(quotes));
    }

    #[tokio::test]
    async fn test_class_ttls() {
        let (cache, clock) = memory_cache();
        cache.put(CacheClass::Quotes, "all", &json!([1]), None).await;
        cache.put(CacheClass::History, "SPY", &json!([2]), None).await;

        clock.advance(Duration::from_secs(120));
        assert!(cache.get::<Value>(CacheClass::Quotes, "all").await.is_none());
        assert!(cache.get::<Value>(CacheClass::History, "SPY").await.is_some());

        clock.advance(Duration::from_secs(180));
        assert!(cache.get::<Value>(CacheClass::History, "SPY").await.is_none());
    }

    #[tokio::test]
    async fn test_explicit_ttl_overrides_class() {
        let (cache, clock) = memory_cache();
        cache
            .put(CacheClass::History, "QQQ", &json!([3]), Some(Duration::from_secs(10)))
            .await;

        clock.advance(Duration::from_secs(10));
        assert!(cache.get::<Value>(CacheClass::History, "QQQ").await.is_none());
    }

    #[tokio::test]
    async fn test_null_is_refused() {
        let (cache, _clock) = memory_cache();

        assert!(!cache.put(CacheClass::History, "XYZ", &Value::Null, None).await);
        assert!(!cache.put::<Option<u32>>(CacheClass::History, "XYZ", &None, None).await);
        assert!(cache.get::<Value>(CacheClass::History, "XYZ").await.is_none());
    }

    #[tokio::test]
    async fn test_classes_do_not_collide() {
        let (cache, _clock) = memory_cache();
        cache.put(CacheClass::Quotes, "SPY", &json!("q"), None).await;

        assert!(cache.get::<Value>(CacheClass::History, "SPY").await.is_none());
        assert_eq!(cache.key(CacheClass::Quotes, "SPY"), "cache:quotes:SPY");
    }

    #[tokio::test]
    async fn test_backend_failures_degrade() {
        let cache = ResultCache::new(Arc::new(BrokenBackend));

        assert!(!cache.put(CacheClass::Quotes, "all", &json!([1]), None).await);
        assert!(cache.get::<Value>(CacheClass::Quotes, "all").await.is_none());
    }

    #[test]
    fn test_from_config() {
        let clock = MockClock::at_epoch_secs(0);
        let config = CacheConfig {
            quotes_ttl_secs: 30,
            history_ttl_secs: 600,
            key_prefix: "qg:".to_string(),
        };
        let cache = ResultCache::from_config(Arc::new(MemoryCacheBackend::new(Arc::new(clock))), &config);

        assert_eq!(cache.default_ttl(CacheClass::Quotes), Duration::from_secs(30));
        assert_eq!(cache.default_ttl(CacheClass::History), Duration::from_secs(600));
        assert_eq!(cache.key(CacheClass::History, "SPY"), "qg:history:SPY");
    }
}
