//! Configuration options for the SmoothFS block cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration options for mounting a SmoothFS cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Number of background fetch workers.
    /// Bounds the backing-store concurrency regardless of how many reads are in flight.
    /// Default: 3
    pub worker_count: usize,

    /// Maximum number of loaded blocks per file before the oldest is unloaded.
    /// Size this by available memory / BLOCK_SIZE in production.
    /// Default: 2
    pub eviction_threshold: usize,

    /// Which loaded block is unloaded first.
    /// Default: EvictionPolicy::Fifo
    pub eviction_policy: EvictionPolicy,

    /// How long a worker waits to hand a completed fetch back to its caller.
    /// Default: 60s
    pub response_timeout: Duration,

    /// Deadline for a whole read request. `None` waits until every fetch reports.
    /// Default: None
    pub request_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            worker_count: 3,
            eviction_threshold: 2,
            eviction_policy: EvictionPolicy::Fifo,
            response_timeout: Duration::from_secs(60),
            request_timeout: None,
        }
    }
}

/// Order in which loaded blocks are unloaded once the threshold is crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Oldest-loaded block first. Reads do not affect the order.
    #[default]
    Fifo,

    /// Least recently read block first. Every cache hit refreshes the block.
    Lru,
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of background fetch workers.
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Sets the per-file loaded block threshold.
    pub fn eviction_threshold(mut self, threshold: usize) -> Self {
        self.eviction_threshold = threshold;
        self
    }

    /// Sets the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Sets the completion delivery window.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets a deadline for every read request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.worker_count == 0 {
            return Err(crate::Error::invalid_argument("worker_count must be > 0"));
        }
        if self.eviction_threshold == 0 {
            return Err(crate::Error::invalid_argument("eviction_threshold must be > 0"));
        }
        if self.response_timeout.is_zero() {
            return Err(crate::Error::invalid_argument("response_timeout must be > 0"));
        }
        if matches!(self.request_timeout, Some(t) if t.is_zero()) {
            return Err(crate::Error::invalid_argument("request_timeout must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.worker_count, 3);
        assert_eq!(opts.eviction_threshold, 2);
        assert_eq!(opts.eviction_policy, EvictionPolicy::Fifo);
        assert_eq!(opts.response_timeout, Duration::from_secs(60));
        assert!(opts.request_timeout.is_none());
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new()
            .worker_count(8)
            .eviction_threshold(1024)
            .eviction_policy(EvictionPolicy::Lru)
            .request_timeout(Duration::from_secs(5));

        assert_eq!(opts.worker_count, 8);
        assert_eq!(opts.eviction_threshold, 1024);
        assert_eq!(opts.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(opts.request_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.worker_count = 0;
        assert!(opts.validate().is_err());

        opts.worker_count = 1;
        opts.eviction_threshold = 0;
        assert!(opts.validate().is_err());

        opts.eviction_threshold = 4;
        opts.request_timeout = Some(Duration::ZERO);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_options_from_json() {
        let opts: Options =
            serde_json::from_str(r#"{"worker_count": 6, "eviction_policy": "lru"}"#).unwrap();
        assert_eq!(opts.worker_count, 6);
        assert_eq!(opts.eviction_policy, EvictionPolicy::Lru);
        // Unspecified fields keep their defaults
        assert_eq!(opts.eviction_threshold, 2);
    }
}
