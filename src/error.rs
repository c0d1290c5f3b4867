//! Error types for the SmoothFS block cache.

use crate::block::BlockNumber;
use std::io;
use thiserror::Error;

/// The result type used throughout SmoothFS.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for SmoothFS operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred outside of a block fetch (opening, spawning).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The positional read of a block failed for a reason other than end-of-file.
    #[error("Backing read of block {block} failed: {source}")]
    BackingRead {
        /// The block whose fetch failed.
        block: BlockNumber,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested file or directory was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A read did not complete within its request deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A completed fetch could not be handed back to its caller in time.
    #[error("Completion for block {block} could not be delivered")]
    DeliveryTimeout {
        /// The block whose completion was dropped.
        block: BlockNumber,
    },

    /// The caller cancelled the read before it was satisfied.
    #[error("Read cancelled")]
    Cancelled,

    /// The read was interrupted by the front end.
    #[error("Read interrupted")]
    Interrupted,

    /// The work queue has been closed.
    #[error("Worker pool has been shut down")]
    ShutDown,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Returns true if the same request may succeed when issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Cancelled | Error::Interrupted)
    }
}
