//! Cache backends
//!
//! String-valued key/value stores with per-entry TTL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::error::StoreResult;

/// Key/value store with expiring entries
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Stored value, `None` when absent or expired
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key` for `ttl`
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: DateTime<Utc>,
}

/// In-memory cache backend
#[derive(Debug, Clone)]
pub struct MemoryCacheBackend {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheBackend {
    /// Create an empty backend
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Remove expired entries
    pub async fn clear_expired(&self) {
        let now = self.clock.now();
        self.entries.write().await.retain(|_, entry| entry.expires_at > now);
    }

    /// Number of entries, including expired ones not yet cleared
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the backend holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.body.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::days(365));
        let expires_at = self.clock.now() + ttl;
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                body: value,
                expires_at,
            },
        );
        Ok(())
    }
}

/// Redis cache backend
#[derive(Clone)]
pub struct RedisCacheBackend {
    connection: ConnectionManager,
}

impl Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheBackend").finish_non_exhaustive()
    }
}

impl RedisCacheBackend {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }

    /// Wrap an existing connection manager
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        // SETEX rejects a zero TTL
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, secs).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    #[tokio::test]
    async fn test_memory_backend_expiry() {
        let clock = MockClock::at_epoch_secs(1_000);
        let backend = MemoryCacheBackend::new(Arc::new(clock.clone()));

        backend
            .set_with_ttl("k", "v".to_string(), Duration::from_secs(120))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(Duration::from_secs(119));
        assert!(backend.get("k").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(backend.get("k").await.unwrap().is_none());

        assert_eq!(backend.len().await, 1);
        backend.clear_expired().await;
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_backend_overwrite() {
        let clock = MockClock::at_epoch_secs(1_000);
        let backend = MemoryCacheBackend::new(Arc::new(clock));

        backend.set_with_ttl("k", "a".to_string(), Duration::from_secs(5)).await.unwrap();
        backend.set_with_ttl("k", "b".to_string(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("b"));
    }
}
