//! Configuration for the request queue.

/// Configuration for the request queue and its worker pool
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of tasks waiting to be picked up
    pub max_size: usize,

    /// Number of workers pulling from the queue.
    /// This bounds concurrent provider calls.
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            workers: 5,
        }
    }
}

impl QueueConfig {
    /// Create config for a single worker, which processes tasks strictly in order
    pub fn sequential(max_size: usize) -> Self {
        Self { max_size, workers: 1 }
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RELAY_QUEUE_MAX_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_size = n.max(1);
            }
        }

        if let Ok(val) = std::env::var("RELAY_QUEUE_WORKERS") {
            if let Ok(n) = val.parse::<usize>() {
                config.workers = n.max(1);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.workers, 5);
    }
}
