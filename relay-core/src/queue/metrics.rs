//! Metrics for the request queue.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics for monitoring queue throughput
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Tasks accepted by submit
    pub tasks_submitted: AtomicU64,

    /// Submissions refused (full or stopped)
    pub tasks_rejected: AtomicU64,

    /// Tasks currently being processed by a worker
    pub tasks_processing: AtomicU64,

    /// Tasks whose work returned Ok
    pub tasks_completed: AtomicU64,

    /// Tasks whose work returned Err or panicked
    pub tasks_failed: AtomicU64,

    /// Tasks discarded at shutdown before a worker picked them up
    pub tasks_dropped: AtomicU64,

    /// Total processing time in milliseconds (for averaging)
    pub total_processing_ms: AtomicU64,
}

impl QueueMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a worker picking up a task
    pub fn record_started(&self) {
        self.tasks_processing.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task finishing, successfully or not
    pub fn record_finished(&self, success: bool, processing_time: Duration) {
        self.tasks_processing.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_processing_ms
            .fetch_add(processing_time.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.tasks_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> QueueStats {
        let completed = self.tasks_completed.load(Ordering::Relaxed);
        let failed = self.tasks_failed.load(Ordering::Relaxed);
        let finished = completed + failed;

        QueueStats {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_processing: self.tasks_processing.load(Ordering::Relaxed),
            tasks_completed: completed,
            tasks_failed: failed,
            tasks_dropped: self.tasks_dropped.load(Ordering::Relaxed),
            avg_processing_ms: if finished == 0 {
                0.0
            } else {
                self.total_processing_ms.load(Ordering::Relaxed) as f64 / finished as f64
            },
        }
    }
}

/// Point-in-time view of [`QueueMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub tasks_submitted: u64,
    pub tasks_rejected: u64,
    pub tasks_processing: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_dropped: u64,
    pub avg_processing_ms: f64,
}
