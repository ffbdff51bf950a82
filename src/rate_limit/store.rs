//! Counter Store
//!
//! Shared storage for the period usage counter. The Redis store is what
//! production runs against; the in-memory store backs tests and
//! single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::StoreResult;

/// Atomic integer counters with absolute expiry
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Atomically add one to `key` and make it expire at `expire_at`
    /// (Unix seconds). Returns the value after the increment.
    async fn incr_and_expire_at(&self, key: &str, expire_at: i64) -> StoreResult<i64>;

    /// Current value, `None` when absent or unreadable
    async fn get(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Remove the counter
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// A stored counter
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: i64,
    expire_at: i64,
}

/// In-memory counter store
#[derive(Debug, Clone)]
pub struct MemoryCounterStore {
    counters: Arc<RwLock<HashMap<String, CounterEntry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    /// Create a new in-memory store
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn is_live(entry: &CounterEntry, now: DateTime<Utc>) -> bool {
        entry.expire_at > now.timestamp()
    }

    /// Expiry time of a counter, if present
    pub async fn expiry_of(&self, key: &str) -> Option<i64> {
        let counters = self.counters.read().await;
        counters.get(key).map(|entry| entry.expire_at)
    }

    /// Remove expired counters
    pub async fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|_, entry| Self::is_live(entry, now));
        before - counters.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr_and_expire_at(&self, key: &str, expire_at: i64) -> StoreResult<i64> {
        let now = self.clock.now();
        let mut counters = self.counters.write().await;

        let entry = counters.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expire_at,
        });
        if !Self::is_live(entry, now) {
            entry.value = 0;
        }
        entry.value += 1;
        entry.expire_at = expire_at;

        Ok(entry.value)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        let now = self.clock.now();
        let counters = self.counters.read().await;
        Ok(counters
            .get(key)
            .filter(|entry| Self::is_live(entry, now))
            .map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.counters.write().await.remove(key);
        Ok(())
    }
}

/// Redis-backed counter store
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
}

impl Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
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
impl CounterStore for RedisCounterStore {
    async fn incr_and_expire_at(&self, key: &str, expire_at: i64) -> StoreResult<i64> {
        let mut conn = self.connection.clone();

        // INCR and EXPIREAT in one MULTI so the counter never outlives its period
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire_at(key, expire_at)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(key, value, expire_at, "Incremented usage counter");
        Ok(value)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(key).await?;

        Ok(raw.and_then(|value| match value.trim().parse::<i64>() {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(key, value = %value, error = %e, "Unreadable counter value, treating as zero");
                None
            }
        }))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
