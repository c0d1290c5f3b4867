//! Work items and the shared work queue drained by the worker pool.

use crate::block::BlockNumber;
use crate::cache::CachedFile;
use crate::error::{Error, Result};
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one dispatched block fetch.
///
/// Exactly one completion is produced per fetch, whether it succeeded or not.
#[derive(Debug)]
pub struct Completion {
    /// The block that was fetched
    pub block: BlockNumber,
    /// Fetched bytes, `None` if the block lies past end-of-file
    pub result: Result<Option<Bytes>>,
}

/// Channel a completion is delivered on, with its delivery window.
#[derive(Debug, Clone)]
pub struct Responder {
    sender: Sender<Completion>,
    window: Duration,
}

impl Responder {
    /// Create a responder delivering on `sender` within `window`
    pub fn new(sender: Sender<Completion>, window: Duration) -> Self {
        Self { sender, window }
    }

    /// How long a worker may wait to deliver
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Deliver a completion, waiting at most the delivery window.
    pub fn deliver(&self, completion: Completion) -> Result<()> {
        let block = completion.block;
        match self.sender.send_timeout(completion, self.window) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(Error::DeliveryTimeout { block }),
            // The caller stopped waiting; the block is cached regardless
            Err(SendTimeoutError::Disconnected(_)) => Err(Error::Cancelled),
        }
    }
}

/// A unit of background work.
pub enum WorkItem {
    /// Fetch one block from the backing store into the file's block map.
    FetchBlock {
        /// File the block belongs to
        file: Arc<CachedFile>,
        /// Block to fill
        block: BlockNumber,
        /// Where to report the outcome, if anyone is waiting
        responder: Option<Responder>,
    },

    /// Unload the oldest loaded block of a file.
    EvictOldest {
        /// File to trim
        file: Arc<CachedFile>,
    },
}

impl WorkItem {
    /// Perform the item's side effect.
    ///
    /// Fetches return their completion; evictions have nothing to report.
    pub fn process(&self) -> Option<Completion> {
        match self {
            WorkItem::FetchBlock { file, block, .. } => {
                Some(Completion { block: *block, result: file.load_block(*block) })
            }
            WorkItem::EvictOldest { file } => {
                file.evict_oldest();
                None
            }
        }
    }

    /// Response channel for this item, `None` for fire-and-forget work.
    pub fn responder(&self) -> Option<&Responder> {
        match self {
            WorkItem::FetchBlock { responder, .. } => responder.as_ref(),
            WorkItem::EvictOldest { .. } => None,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            WorkItem::FetchBlock { .. } => "fetch",
            WorkItem::EvictOldest { .. } => "evict",
        }
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::FetchBlock { file, block, responder } => f
                .debug_struct("FetchBlock")
                .field("file", &file.src_path())
                .field("block", block)
                .field("responds", &responder.is_some())
                .finish(),
            WorkItem::EvictOldest { file } => {
                f.debug_struct("EvictOldest").field("file", &file.src_path()).finish()
            }
        }
    }
}

/// Handle to the single shared work queue.
///
/// Cloning the handle does not keep the queue open: once [`WorkQueue::close`]
/// is called, workers drain what is pending and exit.
#[derive(Clone)]
pub struct WorkQueue {
    sender: Arc<RwLock<Option<Sender<WorkItem>>>>,
}

impl WorkQueue {
    /// Create an open queue and the receiving end for workers
    pub fn open() -> (Self, Receiver<WorkItem>) {
        let (tx, rx) = channel::unbounded();
        (Self { sender: Arc::new(RwLock::new(Some(tx))) }, rx)
    }

    /// Enqueue an item. Never blocks.
    pub fn push(&self, item: WorkItem) -> Result<()> {
        let sender = self.sender.read();
        match sender.as_ref() {
            Some(tx) => tx.send(item).map_err(|_| Error::ShutDown),
            None => Err(Error::ShutDown),
        }
    }

    /// Close the queue. Items already queued are still processed.
    pub fn close(&self) {
        self.sender.write().take();
    }

    /// Check if the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Number of items waiting for a worker
    pub fn len(&self) -> usize {
        self.sender.read().as_ref().map_or(0, |tx| tx.len())
    }

    /// Check if no items are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("closed", &self.is_closed())
            .field("pending", &self.len())
            .finish()
    }
}
