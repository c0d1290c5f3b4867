//! Per-file block map with its load-order record.
//!
//! Every block number in the order queue has a loaded entry in the map and
//! every loaded entry appears in the queue exactly once.

use crate::block::{Block, BlockNumber};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub(crate) struct BlockMap {
    blocks: HashMap<BlockNumber, Block>,
    /// Oldest at the front
    loaded_order: VecDeque<BlockNumber>,
    /// Bytes held by loaded blocks
    size: usize,
}

impl BlockMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bytes of a loaded block, cheap to clone out from under the lock.
    pub(crate) fn loaded_data(&self, block: BlockNumber) -> Option<Bytes> {
        self.blocks.get(&block).filter(|b| b.loaded).map(|b| b.data.clone())
    }

    pub(crate) fn contains(&self, block: BlockNumber) -> bool {
        self.blocks.get(&block).is_some_and(|b| b.loaded)
    }

    /// Store a fetched block.
    ///
    /// Returns true if the block was newly loaded. Replacing an already
    /// loaded block keeps its place in the load order.
    pub(crate) fn insert(&mut self, block: BlockNumber, data: Bytes) -> bool {
        let new_size = data.len();
        match self.blocks.get_mut(&block) {
            Some(existing) if existing.loaded => {
                self.size = self.size - existing.len() + new_size;
                *existing = Block::loaded(data);
                false
            }
            _ => {
                self.blocks.insert(block, Block::loaded(data));
                self.loaded_order.push_back(block);
                self.size += new_size;
                true
            }
        }
    }

    /// Move a block to the most recently used position.
    ///
    /// O(n) in the number of loaded blocks, which stays near the eviction
    /// threshold.
    pub(crate) fn touch(&mut self, block: BlockNumber) {
        if let Some(pos) = self.loaded_order.iter().position(|b| *b == block) {
            self.loaded_order.remove(pos);
            self.loaded_order.push_back(block);
        }
    }

    /// Pop the front of the load order and release its block.
    pub(crate) fn evict_oldest(&mut self) -> Option<BlockNumber> {
        let block = self.loaded_order.pop_front()?;
        if self.contains(block) {
            if let Some(removed) = self.blocks.remove(&block) {
                self.size -= removed.len();
            }
        }
        Some(block)
    }

    /// Number of loaded blocks
    pub(crate) fn len(&self) -> usize {
        self.loaded_order.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Loaded block numbers, oldest first
    pub(crate) fn loaded_order(&self) -> Vec<BlockNumber> {
        self.loaded_order.iter().copied().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
        self.loaded_order.clear();
        self.size = 0;
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let loaded = self.blocks.values().filter(|b| b.loaded).count();
        loaded == self.loaded_order.len()
            && self.loaded_order.iter().all(|b| self.contains(*b))
            && self.size == self.blocks.values().map(Block::len).sum::<usize>()
    }
}
