//! Configuration for the token-bucket rate limiter.

use serde::Serialize;
use std::time::Duration;

/// Request class, each with its own bucket parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitClass {
    /// Everything not matched by a more specific rule (loosest)
    Default,
    /// Authentication endpoints (tightest)
    Auth,
    /// API endpoints (moderate)
    Api,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Default => "default",
            LimitClass::Auth => "auth",
            LimitClass::Api => "api",
        }
    }
}

impl std::fmt::Display for LimitClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket parameters for one class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    /// Sustained refill rate
    pub requests_per_minute: u32,
    /// Bucket capacity
    pub burst_size: u32,
}

impl BucketConfig {
    pub const fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self { requests_per_minute, burst_size }
    }

    /// Tokens added per second
    pub fn refill_per_second(&self) -> f64 {
        self.requests_per_minute as f64 / 60.0
    }

    /// Time for an empty bucket to refill completely, `None` if it never refills
    pub fn full_refill(&self) -> Option<Duration> {
        if self.requests_per_minute == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.burst_size as f64 * 60.0 / self.requests_per_minute as f64,
        ))
    }
}

/// Configuration for the rate limiter and its HTTP middleware
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether limiting is applied at all
    pub enabled: bool,

    /// Bucket for unclassified paths
    pub default: BucketConfig,

    /// Bucket for API paths
    pub api: BucketConfig,

    /// Bucket for authentication paths
    pub auth: BucketConfig,

    /// Prefix rules, first match wins
    pub path_rules: Vec<(String, LimitClass)>,

    /// Paths never limited (health checks)
    pub excluded_paths: Vec<String>,

    /// Minimum idle time before a bucket record expires from the store
    pub bucket_ttl: Duration,

    /// Admit requests when the store is unreachable
    pub fail_open: bool,

    /// Key clients on the first `X-Forwarded-For` hop instead of the socket
    /// peer. Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Bucket records held by the limiter's own store
    pub store_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: BucketConfig::new(60, 100),
            api: BucketConfig::new(30, 50),
            auth: BucketConfig::new(5, 10),
            path_rules: vec![
                ("/api/v1/auth".to_string(), LimitClass::Auth),
                ("/api".to_string(), LimitClass::Api),
            ],
            excluded_paths: vec!["/health".to_string(), "/live".to_string(), "/ready".to_string()],
            bucket_ttl: Duration::from_secs(60),
            fail_open: true,
            trust_forwarded_for: false,
            store_capacity: 100_000,
        }
    }
}

impl RateLimitConfig {
    /// Bucket parameters for a class
    pub fn bucket(&self, class: LimitClass) -> BucketConfig {
        match class {
            LimitClass::Default => self.default,
            LimitClass::Api => self.api,
            LimitClass::Auth => self.auth,
        }
    }

    /// Classify a request path by prefix
    pub fn classify(&self, path: &str) -> LimitClass {
        self.path_rules
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, class)| *class)
            .unwrap_or(LimitClass::Default)
    }

    /// Whether a path bypasses limiting
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| p == path)
    }

    /// Store TTL for a bucket of this class.
    ///
    /// Never shorter than a full refill, so an expired record and a full
    /// bucket are indistinguishable.
    pub fn bucket_ttl(&self, class: LimitClass) -> Duration {
        self.bucket(class)
            .full_refill()
            .map_or(self.bucket_ttl, |refill| refill.max(self.bucket_ttl))
    }

    /// Create config from environment variables
    ///
    /// - `RELAY_RATE_LIMIT_ENABLED`, `RELAY_RATE_LIMIT_FAIL_OPEN`
    /// - `RELAY_RATE_LIMIT_TRUST_FORWARDED_FOR`, `RELAY_RATE_LIMIT_STORE_CAPACITY`
    /// - `RELAY_RATE_LIMIT_{DEFAULT,API,AUTH}_RPM`
    /// - `RELAY_RATE_LIMIT_{DEFAULT,API,AUTH}_BURST`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RELAY_RATE_LIMIT_ENABLED") {
            config.enabled = val == "1" || val.to_lowercase() == "true";
        }

        if let Ok(val) = std::env::var("RELAY_RATE_LIMIT_FAIL_OPEN") {
            config.fail_open = val == "1" || val.to_lowercase() == "true";
        }

        if let Ok(val) = std::env::var("RELAY_RATE_LIMIT_TRUST_FORWARDED_FOR") {
            config.trust_forwarded_for = val == "1" || val.to_lowercase() == "true";
        }

        if let Ok(val) = std::env::var("RELAY_RATE_LIMIT_STORE_CAPACITY") {
            if let Ok(n) = val.parse() {
                config.store_capacity = n;
            }
        }

        for (name, bucket) in [
            ("DEFAULT", &mut config.default),
            ("API", &mut config.api),
            ("AUTH", &mut config.auth),
        ] {
            if let Some(n) = env_u32(&format!("RELAY_RATE_LIMIT_{}_RPM", name)) {
                bucket.requests_per_minute = n;
            }
            if let Some(n) = env_u32(&format!("RELAY_RATE_LIMIT_{}_BURST", name)) {
                bucket.burst_size = n;
            }
        }

        config
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
