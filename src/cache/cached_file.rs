//! The per-file orchestrator.
//!
//! A [`CachedFile`] turns byte-range reads into block-aligned fetches. Blocks
//! already in memory are used as-is; missing ones are handed to the worker
//! pool as [`WorkItem::FetchBlock`] items sharing one response channel, and
//! the caller waits until every one of them has reported back before the
//! requested range is stitched together.

use super::block_map::BlockMap;
use super::stats::CacheStats;
use crate::block::{BlockNumber, BLOCK_SIZE};
use crate::config::{EvictionPolicy, Options};
use crate::error::{Error, Result};
use crate::source::{self, BlockSource, FileSource};
use crate::work::{Completion, Responder, WorkItem, WorkQueue};
use bytes::{Bytes, BytesMut};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Blocks available to one read, `None` for blocks past end-of-file.
type Gathered = HashMap<BlockNumber, Option<Bytes>>;

/// Most blocks a read requests from the pool before checking for end-of-file.
const FETCH_WINDOW: i64 = 64;

/// A backing file fronted by an in-memory block cache.
///
/// # Thread Safety
///
/// The block map and its load order sit behind a single per-file lock, so
/// concurrent reads of the same file and the workers filling it never race.
/// Share it as `Arc<CachedFile>`.
#[derive(Debug)]
pub struct CachedFile {
    /// Absolute path of the file being cached
    src_path: PathBuf,
    /// Reserved for on-disk block persistence; unused by the read path
    cache_path: PathBuf,
    source: Arc<dyn BlockSource>,
    queue: WorkQueue,
    eviction_threshold: usize,
    eviction_policy: EvictionPolicy,
    response_timeout: Duration,
    request_timeout: Option<Duration>,
    state: Mutex<BlockMap>,
    stats: RwLock<CacheStats>,
}

impl CachedFile {
    /// Create a cached file reading from `source`.
    pub fn new(
        src_path: impl Into<PathBuf>,
        cache_path: impl Into<PathBuf>,
        source: Arc<dyn BlockSource>,
        queue: WorkQueue,
        options: &Options,
    ) -> Arc<Self> {
        Arc::new(Self {
            src_path: src_path.into(),
            cache_path: cache_path.into(),
            source,
            queue,
            eviction_threshold: options.eviction_threshold,
            eviction_policy: options.eviction_policy,
            response_timeout: options.response_timeout,
            request_timeout: options.request_timeout,
            state: Mutex::new(BlockMap::new()),
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Create a cached file over the file at `src_path`.
    ///
    /// The file is not opened until the first block is fetched.
    pub fn open(
        src_path: impl Into<PathBuf>,
        cache_path: impl Into<PathBuf>,
        queue: WorkQueue,
        options: &Options,
    ) -> Arc<Self> {
        let src_path = src_path.into();
        let source = Arc::new(FileSource::new(&src_path));
        Self::new(src_path, cache_path, source, queue, options)
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// The result is shorter than `length` only when the range runs past
    /// end-of-file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for negative or overflowing ranges, the
    /// backing error if any needed block could not be fetched, and `Timeout`
    /// if a request deadline is configured and expires.
    pub fn read(self: &Arc<Self>, offset: i64, length: i64) -> Result<Bytes> {
        self.read_with(offset, length, None)
    }

    /// Like [`CachedFile::read`], but gives up with `Cancelled` as soon as
    /// `cancel` receives a message or is disconnected.
    ///
    /// Fetches already queued still complete and populate the cache.
    pub fn read_cancellable(
        self: &Arc<Self>,
        offset: i64,
        length: i64,
        cancel: &Receiver<()>,
    ) -> Result<Bytes> {
        self.read_with(offset, length, Some(cancel))
    }

    /// Start a read on its own thread and deliver the result on `responder`.
    ///
    /// The requester may stop listening at any time; the read still runs to
    /// completion and its result is discarded.
    pub fn read_request(
        self: &Arc<Self>,
        offset: i64,
        length: i64,
        responder: Sender<Result<Bytes>>,
    ) -> Result<()> {
        let file = Arc::clone(self);
        thread::Builder::new().name("smoothfs-read".to_string()).spawn(move || {
            let result = file.read(offset, length);
            if responder.send(result).is_err() {
                log::debug!("Read of {:?} at {} finished after requester left", file.src_path, offset);
            }
        })?;
        Ok(())
    }

    /// Race an asynchronous read against an interrupt signal from the front end.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if `intr` fires first, otherwise the read's own result.
    pub fn read_interruptible(
        self: &Arc<Self>,
        offset: i64,
        length: i64,
        intr: &Receiver<()>,
    ) -> Result<Bytes> {
        let (tx, rx) = channel::bounded(1);
        self.read_request(offset, length, tx)?;

        crossbeam::select! {
            recv(rx) -> msg => msg.unwrap_or_else(|_| Err(Error::internal("read task exited without a result"))),
            recv(intr) -> _ => {
                log::debug!("Read of {:?} at {} interrupted", self.src_path, offset);
                Err(Error::Interrupted)
            }
        }
    }

    /// Fetch `blocks` through the worker pool and wait for all of them.
    ///
    /// Every requested block is attempted before this returns, even when one
    /// fails; the first failure is then reported.
    pub fn retrieve(self: &Arc<Self>, blocks: &[BlockNumber]) -> Result<HashMap<BlockNumber, Option<Bytes>>> {
        self.retrieve_with(blocks, None)
    }

    fn read_with(
        self: &Arc<Self>,
        offset: i64,
        length: i64,
        cancel: Option<&Receiver<()>>,
    ) -> Result<Bytes> {
        let (start, end) = match block_range(offset, length)? {
            Some(range) => range,
            None => return Ok(Bytes::new()),
        };

        self.stats.write().reads += 1;

        // Gathering stops after the first window holding a missing or short block
        let mut gathered = Gathered::new();
        let mut window_start = start;
        loop {
            let window_end = BlockNumber::new(end.get().min(window_start.get() + FETCH_WINDOW - 1));
            self.gather_window(window_start, window_end, &mut gathered, cancel)?;

            if window_end >= end || reaches_eof(window_start, window_end, &gathered) {
                break;
            }
            window_start = window_end.next();
        }

        Ok(assemble(offset, length, start, end, &gathered))
    }

    /// Collect `first..=last` into `gathered`, fetching whatever is not loaded.
    fn gather_window(
        self: &Arc<Self>,
        first: BlockNumber,
        last: BlockNumber,
        gathered: &mut Gathered,
        cancel: Option<&Receiver<()>>,
    ) -> Result<()> {
        let mut hits = 0;
        let mut missing = Vec::new();
        {
            let mut state = self.state.lock();
            let mut block = first;
            while block <= last {
                match state.loaded_data(block) {
                    Some(data) => {
                        gathered.insert(block, Some(data));
                        hits += 1;
                        if self.eviction_policy == EvictionPolicy::Lru {
                            state.touch(block);
                        }
                    }
                    None => missing.push(block),
                }
                block = block.next();
            }
        }

        {
            let mut stats = self.stats.write();
            stats.hits += hits;
            stats.misses += missing.len() as u64;
        }

        log::debug!(
            "Gather {:?} blocks:{}..={} missing:{}",
            self.src_path,
            first,
            last,
            missing.len()
        );

        if !missing.is_empty() {
            gathered.extend(self.retrieve_with(&missing, cancel)?);
        }
        Ok(())
    }

    fn retrieve_with(
        self: &Arc<Self>,
        blocks: &[BlockNumber],
        cancel: Option<&Receiver<()>>,
    ) -> Result<Gathered> {
        if blocks.is_empty() {
            return Ok(Gathered::new());
        }

        let (tx, rx) = channel::bounded(blocks.len());
        let responder = Responder::new(tx, self.response_timeout);
        for &block in blocks {
            self.queue.push(WorkItem::FetchBlock {
                file: Arc::clone(self),
                block,
                responder: Some(responder.clone()),
            })?;
        }
        // Only the queued items hold senders now, so a lost completion
        // disconnects the channel instead of hanging the barrier
        drop(responder);

        let deadline = self.request_timeout.map(|t| Instant::now() + t);
        let mut gathered = Gathered::with_capacity(blocks.len());
        let mut first_error = None;

        for _ in 0..blocks.len() {
            let completion = wait_for_completion(&rx, deadline, cancel)?;
            match completion.result {
                Ok(data) => {
                    gathered.insert(completion.block, data);
                }
                Err(e) => {
                    log::warn!("Fetch of block {} of {:?} failed: {}", completion.block, self.src_path, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(gathered),
        }
    }

    /// Fetch one block from the backing store into the block map.
    ///
    /// Runs on a worker. Queues an eviction when the new block pushes the
    /// loaded count over the threshold.
    pub(crate) fn load_block(self: &Arc<Self>, block: BlockNumber) -> Result<Option<Bytes>> {
        let data = match source::read_block(self.source.as_ref(), block) {
            Ok(Some(data)) => data,
            Ok(None) => {
                log::debug!("Block {} of {:?} is past end-of-file", block, self.src_path);
                self.stats.write().fetches += 1;
                return Ok(None);
            }
            Err(e) => {
                self.stats.write().fetch_errors += 1;
                return Err(e);
            }
        };

        let over_threshold = {
            let mut state = self.state.lock();
            state.insert(block, data.clone()) && state.len() > self.eviction_threshold
        };

        {
            let mut stats = self.stats.write();
            stats.fetches += 1;
            stats.bytes_fetched += data.len() as u64;
        }

        if over_threshold {
            if let Err(e) = self.queue.push(WorkItem::EvictOldest { file: Arc::clone(self) }) {
                log::debug!("Could not queue eviction for {:?}: {}", self.src_path, e);
            }
        }

        Ok(Some(data))
    }

    /// Unload the oldest loaded block.
    ///
    /// Returns the block number taken off the load order, or `None` if no
    /// block is loaded.
    pub fn evict_oldest(&self) -> Option<BlockNumber> {
        let evicted = self.state.lock().evict_oldest()?;
        self.stats.write().evictions += 1;
        log::debug!("Evicted block {} of {:?}", evicted, self.src_path);
        Some(evicted)
    }

    /// Drop every loaded block.
    pub fn clear(&self) {
        self.state.lock().clear();
    }

    /// Check if `block` is currently loaded
    pub fn is_loaded(&self, block: BlockNumber) -> bool {
        self.state.lock().contains(block)
    }

    /// Loaded block numbers in eviction order
    pub fn loaded_blocks(&self) -> Vec<BlockNumber> {
        self.state.lock().loaded_order()
    }

    /// Number of loaded blocks
    pub fn loaded_count(&self) -> usize {
        self.state.lock().len()
    }

    /// Bytes held by loaded blocks
    pub fn cached_bytes(&self) -> usize {
        self.state.lock().size()
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Reset cache statistics to zero.
    pub fn reset_stats(&self) {
        self.stats.write().reset();
    }

    /// Absolute path of the backing file
    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    /// Path reserved for the on-disk block cache
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Loaded block count above which the oldest block is unloaded
    pub fn eviction_threshold(&self) -> usize {
        self.eviction_threshold
    }
}

/// Check if any block in `first..=last` is missing or short.
fn reaches_eof(first: BlockNumber, last: BlockNumber, gathered: &Gathered) -> bool {
    (first.get()..=last.get()).any(|n| match gathered.get(&BlockNumber::new(n)) {
        Some(Some(data)) => data.len() < BLOCK_SIZE,
        _ => true,
    })
}

/// First and last block touched by a read, `None` for an empty read.
fn block_range(offset: i64, length: i64) -> Result<Option<(BlockNumber, BlockNumber)>> {
    if offset < 0 {
        return Err(Error::invalid_argument(format!("negative offset {}", offset)));
    }
    if length < 0 {
        return Err(Error::invalid_argument(format!("negative length {}", length)));
    }
    if length == 0 {
        return Ok(None);
    }
    let last = offset
        .checked_add(length - 1)
        .ok_or_else(|| Error::invalid_argument("read range overflows the file offset range"))?;

    Ok(Some((BlockNumber::containing(offset), BlockNumber::containing(last))))
}

fn wait_for_completion(
    rx: &Receiver<Completion>,
    deadline: Option<Instant>,
    cancel: Option<&Receiver<()>>,
) -> Result<Completion> {
    let lost = || Error::internal("fetch completion was lost");

    match (cancel, deadline) {
        (None, None) => rx.recv().map_err(|_| lost()),
        (None, Some(deadline)) => rx.recv_deadline(deadline).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::timeout("read exceeded its request deadline"),
            RecvTimeoutError::Disconnected => lost(),
        }),
        (Some(cancel), deadline) => {
            let expired = deadline.map_or_else(channel::never, channel::at);
            crossbeam::select! {
                recv(rx) -> msg => msg.map_err(|_| lost()),
                recv(cancel) -> _ => Err(Error::Cancelled),
                recv(expired) -> _ => Err(Error::timeout("read exceeded its request deadline")),
            }
        }
    }
}

/// Stitch the requested range out of the gathered blocks.
///
/// A missing or short block marks end-of-file; nothing after it is returned.
fn assemble(offset: i64, length: i64, start: BlockNumber, end: BlockNumber, gathered: &Gathered) -> Bytes {
    // Intra-block bounds of the first and last block; offset_b is in 1..=BLOCK_SIZE
    let offset_a = (offset - start.offset()) as usize;
    let offset_b = (offset + length - end.offset()) as usize;

    let data_of = |block: BlockNumber| gathered.get(&block).and_then(Option::as_ref);

    if start == end {
        return match data_of(start) {
            Some(data) if data.len() >= offset_b => data.slice(offset_a..offset_b),
            Some(data) if data.len() > offset_a => data.slice(offset_a..),
            _ => Bytes::new(),
        };
    }

    let available: usize = gathered.values().flatten().map(Bytes::len).sum();
    let mut buffer = BytesMut::with_capacity(available.min(length as usize));

    let mut block = start;
    while block <= end {
        let data = match data_of(block) {
            Some(data) => data,
            None => break,
        };

        let lo = if block == start { offset_a } else { 0 };
        let hi = if block == end { offset_b } else { BLOCK_SIZE };
        let (lo, hi) = (lo.min(data.len()), hi.min(data.len()));
        buffer.extend_from_slice(&data[lo..hi]);

        if data.len() < BLOCK_SIZE {
            break;
        }
        block = block.next();
    }

    buffer.freeze()
}
