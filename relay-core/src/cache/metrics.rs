//! Metrics for the shared cache.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache traffic
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Reads that found a live value
    pub hits: AtomicU64,
    /// Reads that found nothing
    pub misses: AtomicU64,
    /// Successful writes
    pub writes: AtomicU64,
    /// Store operations that failed
    pub errors: AtomicU64,
    /// Entries pushed out by the capacity bound
    pub evictions: AtomicU64,
    /// Entries dropped after their TTL
    pub expirations: AtomicU64,
}

impl CacheMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Point-in-time view of [`CacheMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}
