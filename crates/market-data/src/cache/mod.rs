//! TTL-aware cache for provider responses.
//!
//! Expiry is lazy: entries are never swept, they simply stop being returned
//! by [`CacheAdapter::get`] once their TTL has passed. Expired entries stay
//! readable through [`CacheAdapter::get_stale`] so the orchestrator can serve
//! stale data when every provider is down.
//!
//! Values are stored as `serde_json::Value` so a single cache instance can
//! hold quotes, fundamentals and news side by side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};

/// A cached value with the bookkeeping needed for staleness checks.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
    /// Wall-clock time the value was stored, reported back to callers.
    pub stored_at_utc: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }
}

/// Key/value store with TTL and staleness introspection.
///
/// Reads and writes are not transactional. Last writer wins, which is fine
/// because every cached value can be fetched again.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Returns the entry only while it is younger than its TTL.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Returns the entry regardless of age.
    async fn get_stale(&self, key: &str) -> Option<CacheEntry>;

    /// Stores or overwrites an entry.
    async fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Age of the entry, or `None` when the key is absent.
    async fn get_age(&self, key: &str) -> Option<Duration>;

    async fn remove(&self, key: &str);

    async fn clear(&self);

    /// Number of entries, including expired ones.
    async fn len(&self) -> usize;
}

/// In-process cache backed by a `HashMap`.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheAdapter for MemoryCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .cloned()
    }

    async fn get_stale(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now(),
            stored_at_utc: Utc::now(),
            ttl,
        };
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        debug!("Cache: stored '{}' (ttl {:?})", key, ttl);
    }

    async fn get_age(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| entry.age(now))
    }

    async fn remove(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}
