//! Shared key-value cache for rate-limit buckets and completion responses.
//!
//! # Architecture
//!
//! ```text
//!   RateLimiter ──► rate_limit:{identity}:{class} ─┐
//!                                                  ├──► Cache ──► KeyValueStore
//!   CompletionPipeline ──► completion:{xxh3} ──────┘             (MemoryStore)
//! ```
//!
//! The two key namespaces are disjoint, so the consumers never need to
//! coordinate beyond using their own prefix. Expiry is enforced by the
//! store, not by this layer.

mod config;
mod metrics;
mod store;

pub use config::CacheConfig;
pub use metrics::{CacheMetrics, CacheStats};
pub use store::{spawn_sweeper, KeyValueStore, MemoryStore};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::StoreError;

/// Prefix for completion response keys
pub const COMPLETION_KEY_PREFIX: &str = "completion:";

/// Prefix for rate-limit bucket keys
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";

/// Deterministic cache key for a `(prompt, model)` pair
pub fn completion_key(prompt: &str, model: &str) -> String {
    let mut input = String::with_capacity(prompt.len() + model.len() + 1);
    input.push_str(prompt);
    input.push('\0');
    input.push_str(model);

    format!("{}{:016x}", COMPLETION_KEY_PREFIX, xxh3_64(input.as_bytes()))
}

/// Typed facade over a [`KeyValueStore`]
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    metrics: Arc<CacheMetrics>,
}

impl Cache {
    /// Wrap a store, sharing `metrics` with it
    pub fn new(store: Arc<dyn KeyValueStore>, metrics: Arc<CacheMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Build a cache backed by a fresh [`MemoryStore`]
    pub fn in_memory(config: &CacheConfig) -> (Self, Arc<MemoryStore>) {
        let metrics = Arc::new(CacheMetrics::new());
        let store = Arc::new(MemoryStore::new(config.capacity, metrics.clone()));
        (Self::new(store.clone(), metrics), store)
    }

    /// Read and decode a value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let value = match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_error();
                return Err(e);
            }
        };

        match value {
            Some(value) => {
                self.metrics.record_hit();
                Ok(Some(serde_json::from_value(value)?))
            }
            None => {
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    /// Encode and write a value with the given TTL
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        match self.store.set(key, value, ttl).await {
            Ok(()) => {
                self.metrics.record_write();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            }
        }
    }

    /// Remove a key
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.store.delete(key).await
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }
}
