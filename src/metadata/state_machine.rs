//! Inode state machine for log replication.
//!
//! Applies committed [`InodeOp`]s, one at a time and in log order, against the
//! partition's [`InodeStore`]. Application reads nothing but the store and the command
//! itself, so every replica fed the same entries ends up with identical records.
//!
//! Uses snapshot caching for efficient repeated snapshot operations.
//! The serialized snapshot is cached and invalidated on mutations.

use super::allocator::InodeIdAllocator;
use super::operations::{ApplyResult, InodeOp, SetAttrRequest};
use super::store::InodeStore;
use crate::config::PartitionConfig;
use crate::error::{MetanodeError, OpStatus, Result};
use crate::observability;
use crate::raft::{LogEntry, StateMachine};
use crate::types::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Durable image of a partition: records plus allocator mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub partition_id: PartitionId,
    /// Last log index folded into this snapshot.
    pub applied_index: LogIndex,
    pub high_water_mark: InodeId,
    /// Records in ascending id order.
    pub inodes: Vec<Inode>,
}

impl PartitionSnapshot {
    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| MetanodeError::Deserialization(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// The replicated inode state machine for one partition.
pub struct InodeStateMachine {
    partition_id: PartitionId,
    store: Arc<InodeStore>,
    allocator: Arc<InodeIdAllocator>,
    last_applied: LogIndex,
    /// Cached serialized snapshot (invalidated on mutation).
    ///
    /// Its high-water mark covers committed creates only. Ids the proposer reserved
    /// but never committed are not part of replicated state and may lag here.
    snapshot_cache: Mutex<Option<Vec<u8>>>,
    /// Whether the cache is valid.
    snapshot_valid: AtomicBool,
}

impl InodeStateMachine {
    /// Create an empty state machine for the configured partition.
    pub fn new(config: &PartitionConfig) -> Self {
        Self {
            partition_id: config.partition_id,
            store: Arc::new(InodeStore::new()),
            allocator: Arc::new(InodeIdAllocator::new(
                config.partition_id,
                config.start,
                config.end,
            )),
            last_applied: 0,
            snapshot_cache: Mutex::new(None),
            snapshot_valid: AtomicBool::new(false),
        }
    }

    /// Shared store, for read paths that bypass the log.
    pub fn store(&self) -> Arc<InodeStore> {
        Arc::clone(&self.store)
    }

    /// Shared allocator, for proposers reserving ids.
    pub fn allocator(&self) -> Arc<InodeIdAllocator> {
        Arc::clone(&self.allocator)
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Invalidate the snapshot cache (call after any mutation).
    #[inline]
    fn invalidate_snapshot_cache(&self) {
        self.snapshot_valid.store(false, Ordering::Release);
    }

    /// Apply a decoded operation.
    pub fn apply_op(&mut self, op: InodeOp) -> ApplyResult {
        self.invalidate_snapshot_cache();
        let opcode = op.opcode();
        let result = match op {
            InodeOp::CreateInode { inode } => self.create_inode(inode),
            InodeOp::UnlinkInode { inode, now } => self.unlink_inode(inode, now),
            InodeOp::CreateLinkInode { inode, now } => self.create_link_inode(inode, now),
            InodeOp::Open {
                inode,
                token,
                atime,
                expires,
            } => self.open(inode, token, atime, expires),
            InodeOp::ReleaseOpen { inode, token, now } => self.release_open(inode, token, now),
            InodeOp::EvictInode { inode, now } => self.evict_inode(inode, now),
            InodeOp::SetAttr { payload } => self.set_attr(&payload),
        };
        observability::record_apply(opcode, result.status());
        result
    }

    fn create_inode(&mut self, inode: Inode) -> ApplyResult {
        let id = inode.id;
        if !self.allocator.contains(id) {
            error!(partition = self.partition_id, inode = id, "Create outside partition range");
            return ApplyResult::Status(OpStatus::InternalError);
        }

        if !self.store.insert_new(inode.clone()) {
            error!(partition = self.partition_id, inode = id, "Create for an existing inode id");
            return ApplyResult::Status(OpStatus::InternalError);
        }
        self.allocator.observe(id);
        observability::set_inode_count(self.partition_id, self.store.len());

        debug!(inode = id, file_type = ?inode.file_type, "Created inode");
        ApplyResult::Created(inode)
    }

    fn unlink_inode(&mut self, id: InodeId, now: EpochSecs) -> ApplyResult {
        let Some(handle) = self.store.get(id) else {
            return ApplyResult::inode_missing();
        };

        let mut inode = handle.write();
        if inode.delete_mark {
            return ApplyResult::inode_missing();
        }

        if inode.nlink > 0 {
            inode.dec_nlink();
            inode.modify_time = now;
        }
        // Also catches a record left at zero links by a lease that expired unreleased.
        if inode.nlink == 0 {
            if inode.live_lease(now).is_none() {
                inode.mark_deleted();
                debug!(inode = id, "Inode delete-marked");
            } else {
                debug!(inode = id, "Last link removed, delete deferred to lease release");
            }
        }

        ApplyResult::Inode {
            status: OpStatus::Ok,
            inode: Some(inode.clone()),
        }
    }

    fn create_link_inode(&mut self, id: InodeId, now: EpochSecs) -> ApplyResult {
        let Some(handle) = self.store.get(id) else {
            return ApplyResult::inode_missing();
        };

        let mut inode = handle.write();
        if inode.delete_mark {
            return ApplyResult::inode_missing();
        }

        inode.inc_nlink();
        inode.modify_time = now;
        ApplyResult::Inode {
            status: OpStatus::Ok,
            inode: Some(inode.clone()),
        }
    }

    fn open(
        &mut self,
        id: InodeId,
        token: LeaseToken,
        atime: EpochSecs,
        expires: EpochSecs,
    ) -> ApplyResult {
        let missing = ApplyResult::Lease {
            status: OpStatus::NotExist,
            lease: None,
        };
        let Some(handle) = self.store.get(id) else {
            return missing;
        };

        let mut inode = handle.write();
        if inode.delete_mark {
            return missing;
        }

        inode.access_time = atime;
        let lease = match inode.lease {
            Some(mut held) if held.is_live(atime) => {
                held.expires = held.expires.max(expires);
                held
            }
            _ => Lease { token, expires },
        };
        inode.lease = Some(lease);

        debug!(inode = id, token = %lease.token, expires = lease.expires, "Lease granted");
        ApplyResult::Lease {
            status: OpStatus::Ok,
            lease: Some(lease),
        }
    }

    fn release_open(&mut self, id: InodeId, token: LeaseToken, now: EpochSecs) -> ApplyResult {
        let Some(handle) = self.store.get(id) else {
            return ApplyResult::Status(OpStatus::NotExist);
        };

        let mut inode = handle.write();
        let held = inode.lease;
        match held {
            Some(held) if held.token == token => {
                inode.lease = None;
                if inode.nlink == 0 {
                    inode.mark_deleted();
                }
                debug!(inode = id, now, "Lease released");
            }
            _ => {
                debug!(inode = id, token = %token, "Release with stale token ignored");
                if inode.nlink == 0 && !inode.delete_mark && inode.live_lease(now).is_none() {
                    inode.mark_deleted();
                    debug!(inode = id, "Orphaned inode delete-marked after lease expiry");
                }
            }
        }
        ApplyResult::Status(OpStatus::Ok)
    }

    fn evict_inode(&mut self, id: InodeId, now: EpochSecs) -> ApplyResult {
        let Some(handle) = self.store.get(id) else {
            return ApplyResult::Status(OpStatus::NotExist);
        };
        let evictable = handle.read().is_evictable(now);

        if !evictable {
            debug!(inode = id, "Eviction deferred: links or live lease remain");
            return ApplyResult::Status(OpStatus::Ok);
        }

        self.store.delete(id);
        observability::set_inode_count(self.partition_id, self.store.len());
        debug!(inode = id, "Inode evicted");
        ApplyResult::Status(OpStatus::Ok)
    }

    fn set_attr(&mut self, payload: &[u8]) -> ApplyResult {
        let req = match SetAttrRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "Rejected undecodable SetAttr payload");
                return ApplyResult::Status(OpStatus::InternalError);
            }
        };

        // Build the new record from a copy, then swap it in whole.
        let mut updated = match self.store.snapshot(req.inode) {
            Some(inode) if !inode.delete_mark => inode,
            _ => return ApplyResult::Status(OpStatus::NotExist),
        };
        req.apply_to(&mut updated);
        self.store.put(updated);
        ApplyResult::Status(OpStatus::Ok)
    }

    fn build_snapshot(&self) -> PartitionSnapshot {
        PartitionSnapshot {
            partition_id: self.partition_id,
            applied_index: self.last_applied,
            high_water_mark: self.allocator.high_water_mark(),
            inodes: self.store.to_vec(),
        }
    }
}

impl StateMachine for InodeStateMachine {
    type Result = ApplyResult;

    fn apply(&mut self, entry: &LogEntry) -> Self::Result {
        if entry.index <= self.last_applied {
            error!(
                index = entry.index,
                last_applied = self.last_applied,
                "Refusing entry at or below the applied index"
            );
            return ApplyResult::Status(OpStatus::InternalError);
        }
        self.last_applied = entry.index;
        match InodeOp::decode(entry.data_bytes()) {
            Ok(op) => self.apply_op(op),
            Err(e) => {
                error!(index = entry.index, error = %e, "Failed to deserialize inode operation");
                ApplyResult::Status(OpStatus::InternalError)
            }
        }
    }

    fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        // Check if we have a valid cached snapshot
        if self.snapshot_valid.load(Ordering::Acquire) {
            let cache = self.snapshot_cache.lock();
            if let Some(ref cached) = *cache {
                return Ok(cached.clone());
            }
        }

        let serialized = self.build_snapshot().encode()?;

        // Cache the serialized snapshot
        {
            let mut cache = self.snapshot_cache.lock();
            *cache = Some(serialized.clone());
        }
        self.snapshot_valid.store(true, Ordering::Release);

        Ok(serialized)
    }

    fn restore(&mut self, snapshot: &[u8]) -> Result<()> {
        let snapshot = PartitionSnapshot::decode(snapshot)?;
        if snapshot.partition_id != self.partition_id {
            return Err(MetanodeError::InvalidArgument(format!(
                "Snapshot belongs to partition {}, not {}",
                snapshot.partition_id, self.partition_id
            )));
        }

        let count = snapshot.inodes.len();
        self.store.replace_all(snapshot.inodes);
        self.allocator.restore(snapshot.high_water_mark);
        self.last_applied = snapshot.applied_index;
        observability::set_inode_count(self.partition_id, count);

        // Invalidate cache since state has changed
        self.invalidate_snapshot_cache();

        debug!(
            partition = self.partition_id,
            inodes = count,
            applied_index = self.last_applied,
            "Restored partition snapshot"
        );
        Ok(())
    }
}
