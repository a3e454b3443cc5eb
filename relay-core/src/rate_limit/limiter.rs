//! Token-bucket admission over the shared cache.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use xxhash_rust::xxh3::xxh3_64;

use super::config::{BucketConfig, LimitClass, RateLimitConfig};
use super::metrics::{RateLimitMetrics, RateLimitStats};
use crate::cache::{Cache, CacheMetrics, MemoryStore, RATE_LIMIT_KEY_PREFIX};
use crate::error::StoreError;

/// Number of lock stripes guarding bucket read-modify-write cycles
const LOCK_STRIPES: usize = 64;

/// Persisted bucket record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct BucketState {
    tokens: f64,
    last_update: f64,
}

/// Outcome of a single admission check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Bucket capacity
    pub limit: u32,
    /// Whole tokens left after this request
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the bucket is full again
    pub reset_at: u64,
    /// On denial, how long until one token is available
    pub retry_after: Option<Duration>,
}

/// Store key for a bucket
pub fn bucket_key(identity: &str, class: LimitClass) -> String {
    format!("{}{}:{}", RATE_LIMIT_KEY_PREFIX, identity, class)
}

/// Token-bucket rate limiter.
///
/// Buckets live in a [`Cache`] and expire through its TTL once idle. The
/// store should hold nothing but buckets: an LRU store shared with other
/// data evicts buckets early, and an evicted bucket comes back full.
/// [`RateLimiter::in_memory`] builds such a dedicated store.
///
/// The read-modify-write of a bucket happens under one of a fixed set of
/// striped locks, so checks on the same key are serialized while unrelated
/// clients rarely contend.
pub struct RateLimiter {
    cache: Cache,
    config: RateLimitConfig,
    locks: Vec<Mutex<()>>,
    metrics: Arc<RateLimitMetrics>,
}

impl RateLimiter {
    /// Create a limiter storing its buckets in `cache`
    pub fn new(cache: Cache, config: RateLimitConfig) -> Self {
        Self {
            cache,
            config,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            metrics: Arc::new(RateLimitMetrics::new()),
        }
    }

    /// Create a limiter over its own [`MemoryStore`] of
    /// `config.store_capacity` buckets
    pub fn in_memory(config: RateLimitConfig) -> (Self, Arc<MemoryStore>) {
        let metrics = Arc::new(CacheMetrics::new());
        let store = Arc::new(MemoryStore::new(config.store_capacity, metrics.clone()));
        (Self::new(Cache::new(store.clone(), metrics), config), store)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn stats(&self) -> RateLimitStats {
        self.metrics.snapshot()
    }

    /// Check and consume one token for `identity` in `class`
    pub async fn check(&self, identity: &str, class: LimitClass) -> RateLimitDecision {
        self.check_at(identity, class, unix_now()).await
    }

    /// Same as [`RateLimiter::check`] with an explicit clock reading in
    /// fractional Unix seconds.
    pub async fn check_at(&self, identity: &str, class: LimitClass, now: f64) -> RateLimitDecision {
        let bucket = self.config.bucket(class);
        let key = bucket_key(identity, class);

        let _guard = self.stripe(&key).lock().await;

        match self.consume(&key, class, bucket, now).await {
            Ok(decision) => {
                if decision.allowed {
                    self.metrics.record_allowed();
                } else {
                    self.metrics.record_denied();
                    tracing::debug!(identity, %class, "Rate limit exceeded");
                }
                decision
            }
            Err(e) => self.on_store_error(identity, class, bucket, now, e),
        }
    }

    async fn consume(
        &self,
        key: &str,
        class: LimitClass,
        bucket: BucketConfig,
        now: f64,
    ) -> Result<RateLimitDecision, StoreError> {
        let burst = bucket.burst_size as f64;
        let rate = bucket.refill_per_second();

        let state = self.cache.get::<BucketState>(key).await?.unwrap_or(BucketState {
            tokens: burst,
            last_update: now,
        });

        // Clock skew between instances must not drain a bucket
        let elapsed = (now - state.last_update).max(0.0);
        let tokens = (state.tokens + elapsed * rate).clamp(0.0, burst);

        if tokens >= 1.0 {
            let remaining = tokens - 1.0;
            self.cache
                .set(
                    key,
                    &BucketState { tokens: remaining, last_update: now },
                    self.config.bucket_ttl(class),
                )
                .await?;

            Ok(RateLimitDecision {
                allowed: true,
                limit: bucket.burst_size,
                remaining: remaining.floor() as u32,
                reset_at: reset_timestamp(now, burst - remaining, rate),
                retry_after: None,
            })
        } else {
            Ok(RateLimitDecision {
                allowed: false,
                limit: bucket.burst_size,
                remaining: 0,
                reset_at: reset_timestamp(now, burst - tokens, rate),
                retry_after: Some(wait_for(1.0 - tokens, rate, self.config.bucket_ttl(class))),
            })
        }
    }

    fn on_store_error(
        &self,
        identity: &str,
        class: LimitClass,
        bucket: BucketConfig,
        now: f64,
        err: StoreError,
    ) -> RateLimitDecision {
        self.metrics.record_store_error();

        if self.config.fail_open {
            tracing::warn!(identity, %class, error = %err, "Rate limit store unavailable, admitting");
            self.metrics.record_allowed();
            RateLimitDecision {
                allowed: true,
                limit: bucket.burst_size,
                remaining: bucket.burst_size,
                reset_at: now.ceil() as u64,
                retry_after: None,
            }
        } else {
            tracing::warn!(identity, %class, error = %err, "Rate limit store unavailable, rejecting");
            self.metrics.record_denied();
            RateLimitDecision {
                allowed: false,
                limit: bucket.burst_size,
                remaining: 0,
                reset_at: (now + 1.0).ceil() as u64,
                retry_after: Some(Duration::from_secs(1)),
            }
        }
    }

    fn stripe(&self, key: &str) -> &Mutex<()> {
        &self.locks[(xxh3_64(key.as_bytes()) % self.locks.len() as u64) as usize]
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Time to accumulate `missing` tokens, falling back when the bucket never refills
fn wait_for(missing: f64, rate: f64, fallback: Duration) -> Duration {
    if rate <= 0.0 {
        return fallback;
    }
    Duration::from_secs_f64((missing / rate).max(0.0))
}

fn reset_timestamp(now: f64, missing: f64, rate: f64) -> u64 {
    if rate <= 0.0 {
        return now.ceil() as u64;
    }
    (now + missing.max(0.0) / rate).ceil() as u64
}
