//! Inode metadata for one partition.
//!
//! The partition owns a contiguous range of inode ids. Mutations are proposed through
//! the replicated log and applied by [`InodeStateMachine`] on every replica; reads are
//! served straight from the [`InodeStore`].

// Deny unsafe code patterns in this critical metadata module.
// Panics in metadata operations can cause replica divergence.
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod allocator;
mod operations;
mod partition;
mod reply;
mod state_machine;
mod store;

pub use allocator::InodeIdAllocator;
pub use operations::{ApplyResult, InodeOp, Opcode, SetAttrRequest};
pub use partition::{Clock, CreateInodeRequest, MetaPartition, SystemClock};
pub use reply::{
    AuthResponse, BatchInodeGetResponse, CreateInodeResponse, InodeGetResponse, InodeInfo,
    LinkInodeResponse, OpenResponse, Reply, Request, UnlinkInodeResponse,
};
pub use state_machine::{InodeStateMachine, PartitionSnapshot};
pub use store::{InodeHandle, InodeStore};
