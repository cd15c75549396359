//! Extension-block arena.
//!
//! Blocks live back to back in one zero-filled region and are referred to by
//! index. Indices are handed out from a free list first, then from a
//! high-water mark, so creating a large pool costs nothing up front.

use super::slot::{BLOCK_SLOTS, Slot};
use crate::mmap::SlotRegion;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// Block storage, shared with readers.
pub(super) struct BlockArena {
    region: SlotRegion,
}

impl BlockArena {
    pub fn new(capacity: u32, huge_page: Option<bool>) -> io::Result<Self> {
        let region = SlotRegion::zeroed(capacity as usize * BLOCK_SLOTS, huge_page)?;
        Ok(BlockArena { region })
    }

    #[inline(always)]
    pub fn slot(&self, block: u32, index: usize) -> &AtomicU64 {
        &self.region.slots()[block as usize * BLOCK_SLOTS + index]
    }

    pub fn block(&self, block: u32) -> &[AtomicU64] {
        let start = block as usize * BLOCK_SLOTS;
        &self.region.slots()[start..start + BLOCK_SLOTS]
    }

    pub fn mapped_bytes(&self) -> usize {
        self.region.mapped_bytes()
    }
}

/// Allocation bookkeeping, owned by the writer.
pub(super) struct BlockPool {
    free: Vec<u32>,
    next: u32,
    capacity: u32,
}

impl BlockPool {
    pub fn new(capacity: u32) -> Self {
        BlockPool {
            free: Vec::new(),
            next: 0,
            capacity,
        }
    }

    pub fn available(&self) -> usize {
        (self.capacity - self.next) as usize + self.free.len()
    }

    pub fn used(&self) -> usize {
        self.next as usize - self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Takes a block and fills it with `fill`. The caller publishes the block
    /// by storing `Slot::ext` into the parent with release ordering.
    pub fn alloc(&mut self, arena: &BlockArena, fill: Slot) -> Option<u32> {
        let block = match self.free.pop() {
            Some(b) => b,
            None if self.next < self.capacity => {
                self.next += 1;
                self.next - 1
            }
            None => return None,
        };
        for slot in arena.block(block) {
            slot.store(fill.raw(), Ordering::Relaxed);
        }
        Some(block)
    }

    pub fn release(&mut self, block: u32) {
        debug_assert!(block < self.next && !self.free.contains(&block));
        self.free.push(block);
    }
}
