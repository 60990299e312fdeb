//! Inode id allocation within a partition's range.
//!
//! The cursor is the high-water mark: the largest id either handed out locally or
//! observed in a committed CreateInode. `next` always returns an id above it. Because
//! every replica raises its mark when applying a create, and the mark is part of the
//! partition snapshot, a new leader never reissues a committed id.

use crate::error::{MetanodeError, Result};
use crate::types::{InodeId, PartitionId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues monotonically increasing inode ids in `start..=end`.
#[derive(Debug)]
pub struct InodeIdAllocator {
    partition: PartitionId,
    start: InodeId,
    end: InodeId,
    cursor: AtomicU64,
}

impl InodeIdAllocator {
    pub fn new(partition: PartitionId, start: InodeId, end: InodeId) -> Self {
        Self {
            partition,
            start,
            end,
            cursor: AtomicU64::new(start.saturating_sub(1)),
        }
    }

    /// Reserve the next id, or fail once the range is consumed.
    pub fn next(&self) -> Result<InodeId> {
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur < self.end).then_some(cur + 1)
            })
            .map(|prev| prev + 1)
            .map_err(|_| MetanodeError::IdSpaceExhausted {
                partition: self.partition,
                start: self.start,
                end: self.end,
            })
    }

    /// Raise the high-water mark to at least `id`.
    pub fn observe(&self, id: InodeId) {
        self.cursor.fetch_max(id, Ordering::AcqRel);
    }

    /// Largest id handed out or observed so far (`start - 1` when none).
    pub fn high_water_mark(&self) -> InodeId {
        self.cursor.load(Ordering::Acquire)
    }

    /// Reset the mark from a snapshot. Never moves below the start of the range.
    pub fn restore(&self, high_water_mark: InodeId) {
        let floor = self.start.saturating_sub(1);
        self.cursor.store(high_water_mark.max(floor), Ordering::Release);
    }

    /// Ids still available.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.high_water_mark())
    }

    pub fn contains(&self, id: InodeId) -> bool {
        id >= self.start && id <= self.end
    }

    pub fn range(&self) -> (InodeId, InodeId) {
        (self.start, self.end)
    }
}
