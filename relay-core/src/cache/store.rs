//! Key-value store contract and the in-memory LRU backend.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::metrics::CacheMetrics;
use crate::error::StoreError;

/// Shared key-value store with per-key expiry.
///
/// Implementations must make reads after the TTL has elapsed return `None`.
/// Individual key operations are expected to be internally consistent; no
/// cross-key transactions are required.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a value that expires after `ttl`
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Check whether a live value exists for `key`
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Drop every entry
    async fn clear(&self) -> Result<(), StoreError>;
}

/// A stored value with its expiry deadline
struct StoredValue {
    value: Value,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory store using LRU eviction and TTL expiration.
///
/// Expired entries are dropped lazily on read and in bulk by
/// [`MemoryStore::purge_expired`], which [`spawn_sweeper`] calls periodically.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, StoredValue>>,
    metrics: Arc<CacheMetrics>,
}

impl MemoryStore {
    /// Create a new store holding at most `capacity` entries
    pub fn new(capacity: usize, metrics: Arc<CacheMetrics>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            metrics,
        }
    }

    /// Current number of entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
            self.metrics.record_expiration();
        }

        expired.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
            None => return Ok(None),
        }

        // Expired: drop it so the slot can be reused
        entries.pop(key);
        self.metrics.record_expiration();
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(key.to_string(), StoredValue::new(value, ttl)) {
            if evicted != key {
                self.metrics.record_eviction();
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().await.pop(key).is_some())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// Spawn a background task that purges expired entries from every store
/// each `interval` until `cancel` fires.
pub fn spawn_sweeper(
    stores: Vec<Arc<MemoryStore>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Cache sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let mut purged = 0;
                    for store in &stores {
                        purged += store.purge_expired().await;
                    }
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired cache entries");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(capacity: usize) -> MemoryStore {
        MemoryStore::new(capacity, Arc::new(CacheMetrics::new()))
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = store(10);
        store.set("k", json!({"a": 1}), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let store = store(10);
        store.set("k", json!("v"), Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(json!("v")));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let metrics = Arc::new(CacheMetrics::new());
        let store = MemoryStore::new(10, metrics.clone());
        store.set("short", json!(1), Duration::from_secs(1)).await.unwrap();
        store.set("long", json!(2), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(metrics.snapshot().expirations, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let metrics = Arc::new(CacheMetrics::new());
        let store = MemoryStore::new(2, metrics.clone());
        let ttl = Duration::from_secs(60);

        store.set("one", json!(1), ttl).await.unwrap();
        store.set("two", json!(2), ttl).await.unwrap();
        store.set("three", json!(3), ttl).await.unwrap();

        assert_eq!(store.get("one").await.unwrap(), None);
        assert!(store.get("two").await.unwrap().is_some());
        assert!(store.get("three").await.unwrap().is_some());
        assert_eq!(metrics.snapshot().evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_is_not_eviction() {
        let metrics = Arc::new(CacheMetrics::new());
        let store = MemoryStore::new(2, metrics.clone());
        let ttl = Duration::from_secs(60);

        store.set("k", json!(1), ttl).await.unwrap();
        store.set("k", json!(2), ttl).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(metrics.snapshot().evictions, 0);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = store(10);
        let ttl = Duration::from_secs(60);
        store.set("a", json!(1), ttl).await.unwrap();
        store.set("b", json!(2), ttl).await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let store = Arc::new(store(10));
        store.set("k", json!(1), Duration::from_secs(1)).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(vec![store.clone()], Duration::from_secs(10), cancel.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(store.is_empty().await);

        cancel.cancel();
        handle.await.unwrap();
    }
}
