//! Block arithmetic and the cached block record.

use bytes::Bytes;
use std::fmt;

/// Size of every block in bytes. Only the final block of a file may be shorter.
pub const BLOCK_SIZE: usize = 65536;

/// Position of a block within a file.
///
/// Block `n` covers the byte range `[n * BLOCK_SIZE, (n + 1) * BLOCK_SIZE)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockNumber(i64);

impl BlockNumber {
    /// Create a block number
    pub const fn new(n: i64) -> Self {
        Self(n)
    }

    /// The block containing byte `offset`
    pub const fn containing(offset: i64) -> Self {
        Self(offset / BLOCK_SIZE as i64)
    }

    /// Byte offset of the first byte of this block
    pub const fn offset(self) -> i64 {
        self.0 * BLOCK_SIZE as i64
    }

    /// The following block
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The raw block index
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The content of one block-aligned region of a file.
///
/// A block is never mutated in place; a refetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Whether the block holds valid data
    pub loaded: bool,
    /// Block bytes, shorter than BLOCK_SIZE only at end-of-file
    pub data: Bytes,
}

impl Block {
    /// Create a loaded block from fetched bytes
    pub fn loaded(data: Bytes) -> Self {
        Self { loaded: true, data }
    }

    /// Number of bytes in the block
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the block holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True for a block truncated by end-of-file
    pub fn is_short(&self) -> bool {
        self.data.len() < BLOCK_SIZE
    }
}
