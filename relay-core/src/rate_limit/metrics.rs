//! Metrics for the rate limiter.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for admission decisions
#[derive(Debug, Default)]
pub struct RateLimitMetrics {
    /// Requests admitted
    pub allowed: AtomicU64,

    /// Requests rejected for an empty bucket
    pub denied: AtomicU64,

    /// Checks that could not reach the bucket store
    pub store_errors: AtomicU64,
}

impl RateLimitMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> RateLimitStats {
        RateLimitStats {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub allowed: u64,
    pub denied: u64,
    pub store_errors: u64,
}
