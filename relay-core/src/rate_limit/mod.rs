//! Per-client token-bucket rate limiting.
//!
//! # Algorithm
//!
//! ```text
//!   check(identity, class)
//!        │
//!        ▼
//!   lock stripe(xxh3(key))
//!        │
//!   load (tokens, last_update) ── absent ──► (burst, now)
//!        │
//!   tokens = min(burst, tokens + elapsed * rpm/60)
//!        │
//!   tokens >= 1 ? ── yes ──► store (tokens - 1, now), allow
//!        │
//!        no ──► deny with retry-after, store untouched
//! ```
//!
//! Bucket records are only ever refreshed, never deleted; idle buckets fall
//! out of the store when their TTL lapses.

mod config;
mod limiter;
mod metrics;

pub use config::{BucketConfig, LimitClass, RateLimitConfig};
pub use limiter::{bucket_key, RateLimitDecision, RateLimiter};
pub use metrics::{RateLimitMetrics, RateLimitStats};
