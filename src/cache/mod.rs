//! Block cache for files on a slow backing store.
//!
//! Provides [`CachedFile`], which serves arbitrary byte-range reads from
//! fixed-size blocks fetched in the background, and bounds memory by
//! unloading old blocks once a per-file threshold is crossed.

mod block_map;
mod cached_file;
mod stats;

pub use cached_file::CachedFile;
pub use stats::CacheStats;
