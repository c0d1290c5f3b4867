//! Per-file cache counters.

use serde::Serialize;

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of read requests served
    pub reads: u64,
    /// Blocks found loaded when a read needed them
    pub hits: u64,
    /// Blocks a read had to fetch
    pub misses: u64,
    /// Successful backing-store block fetches (including empty end-of-file fetches)
    pub fetches: u64,
    /// Block fetches that failed
    pub fetch_errors: u64,
    /// Bytes read from the backing store
    pub bytes_fetched: u64,
    /// Loaded blocks released by eviction
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the block hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
