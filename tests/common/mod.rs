//! Common test utilities for integration tests.

pub mod assertions;
pub mod fixtures;

use async_trait::async_trait;
use metanode::config::PartitionConfig;
use metanode::metadata::{ApplyResult, Clock, CreateInodeRequest, MetaPartition};
use metanode::raft::{LogHandle, ReplicatedLog};
use metanode::types::{EpochSecs, InodeId, PartitionId};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Re-export common types
pub use assertions::*;
pub use fixtures::*;

/// Fixed epoch used as the starting point of manual clocks.
pub const T0: EpochSecs = 1_700_000_000;

/// Partition config with a short timeout and a 30s lease.
pub fn partition_config(partition_id: PartitionId, start: InodeId, end: InodeId) -> PartitionConfig {
    PartitionConfig {
        partition_id,
        start,
        end,
        propose_timeout: Duration::from_millis(500),
        lease_duration: Duration::from_secs(30),
    }
}

/// Clock the test moves by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: EpochSecs) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now),
        })
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EpochSecs {
        self.now.load(Ordering::SeqCst)
    }
}

/// Log that accepts proposals and never commits them.
pub struct StalledLog;

#[async_trait]
impl ReplicatedLog<ApplyResult> for StalledLog {
    async fn propose(&self, _command: Vec<u8>) -> metanode::Result<ApplyResult> {
        std::future::pending().await
    }
}

/// A leader-only partition driven by a manual clock starting at [`T0`].
pub fn test_partition(
    start: InodeId,
    end: InodeId,
) -> (MetaPartition, LogHandle<ApplyResult>, Arc<ManualClock>) {
    let clock = ManualClock::new(T0);
    let (partition, log) = MetaPartition::start(partition_config(1, start, end), 1, 0);
    let partition = partition.with_clock(clock.clone());
    (partition, log, clock)
}

pub fn regular_file() -> CreateInodeRequest {
    CreateInodeRequest {
        mode: 0o644,
        uid: 1000,
        gid: 1000,
        target: None,
    }
}

pub fn directory() -> CreateInodeRequest {
    CreateInodeRequest {
        mode: libc::S_IFDIR as u32 | 0o755,
        uid: 1000,
        gid: 1000,
        target: None,
    }
}
