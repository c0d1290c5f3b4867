//! # SmoothFS - A block-granularity read cache for high-latency filesystems
//!
//! Network filesystems and other laggy stores often have good throughput but
//! a high latency per request. Applications that issue small reads spaced
//! apart in time (a media player, for example) pay that latency on every
//! call. SmoothFS masks it: reads are mapped onto fixed-size blocks, missing
//! blocks are fetched in large aligned reads by a bounded pool of background
//! workers, and later reads are served from memory.
//!
//! ## Architecture
//!
//! - **Block**: one [`BLOCK_SIZE`]-aligned region of a file
//! - **BlockSource**: positional reader over the backing store
//! - **WorkQueue / WorkerPool**: shared queue and fixed-size executor for
//!   block fetches and evictions
//! - **CachedFile**: per-file block map, scatter/gather retrieval and range
//!   reassembly
//! - **Eviction**: once a file holds more loaded blocks than the threshold,
//!   the oldest is unloaded
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use smoothfs::{Options, SmoothFs};
//!
//! # fn main() -> Result<(), smoothfs::Error> {
//! let options = Options::default().worker_count(4).eviction_threshold(256);
//! let fs = SmoothFs::mount("/mnt/slow", "/var/cache/smoothfs", options)?;
//!
//! let file = fs.open("video.mkv")?;
//! let chunk = file.read(1_000_000, 4096)?;
//! println!("read {} bytes", chunk.len());
//!
//! fs.unmount()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod block;
pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod pool;
pub mod source;
pub mod work;

// Re-exports
pub use block::{Block, BlockNumber, BLOCK_SIZE};
pub use cache::{CacheStats, CachedFile};
pub use config::{EvictionPolicy, Options};
pub use error::{Error, Result};
pub use fs::SmoothFs;
pub use pool::WorkerPool;
pub use source::{BlockSource, FileSource};
pub use work::{Completion, Responder, WorkItem, WorkQueue};
