//! Replicated command log seam for the metanode partition.
//!
//! Consensus itself lives outside this crate. The partition only needs
//! [`ReplicatedLog::propose`] with apply-once, order-preserving semantics, and a
//! [`StateMachine`] that every replica drives with the same committed entries.
//! [`LocalLog`] provides those semantics in-process for a single replica group.

// Deny unsafe code patterns in this critical consensus module.
// unwrap() calls can cause panics that break replica convergence.
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod local;
mod log;
mod state;

pub use local::{LocalLog, LogCommand, LogHandle};
pub use log::{LogEntry, RaftLog};
pub use state::{NodeState, RaftState};

use crate::error::Result;
use crate::types::LogIndex;
use async_trait::async_trait;

/// Trait for state machines that can be driven by the replicated log.
pub trait StateMachine: Send + Sync {
    /// The result type for operations.
    type Result: Send + Clone;

    /// Apply a committed entry. Must be a pure function of current state and entry.
    fn apply(&mut self, entry: &LogEntry) -> Self::Result;

    /// Index of the last entry applied (or covered by a restored snapshot).
    fn last_applied(&self) -> LogIndex;

    /// Create a snapshot of the current state.
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Restore state from a snapshot.
    fn restore(&mut self, snapshot: &[u8]) -> Result<()>;
}

/// Total-order broadcast of proposed commands.
///
/// `propose` resolves once the command is committed and applied on the local replica,
/// returning the local apply result. Errors are retryable when nothing was committed.
#[async_trait]
pub trait ReplicatedLog<R: Send + 'static>: Send + Sync {
    async fn propose(&self, command: Vec<u8>) -> Result<R>;
}

/// Apply every entry newer than the state machine's last applied index, in order.
///
/// Entries already covered by a restored snapshot are skipped, so replaying an
/// overlapping tail is harmless. Returns the number of entries applied.
pub fn replay<S: StateMachine>(state_machine: &mut S, entries: &[LogEntry]) -> usize {
    let mut applied = 0;
    for entry in entries {
        if entry.index <= state_machine.last_applied() {
            continue;
        }
        state_machine.apply(entry);
        applied += 1;
    }
    tracing::debug!(applied, last_applied = state_machine.last_applied(), "Replayed log entries");
    applied
}
