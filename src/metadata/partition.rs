//! Partition operation handlers.
//!
//! Mutations are encoded as [`InodeOp`]s and proposed through the replicated log; the
//! caller waits for the local apply result. Reads go straight to the shared
//! [`InodeStore`] and may be slightly stale on a lagging replica.
//!
//! Retrying a timed-out `create_inode` reserves a fresh id, so create is not idempotent
//! under retry. Likewise a mutation that committed but whose reply was lost will apply
//! twice if blindly retried.

use super::allocator::InodeIdAllocator;
use super::operations::{ApplyResult, InodeOp, SetAttrRequest};
use super::state_machine::InodeStateMachine;
use super::store::InodeStore;
use crate::config::PartitionConfig;
use crate::error::{MetanodeError, OpStatus, Result};
use crate::raft::{LocalLog, LogHandle, ReplicatedLog};
use crate::types::*;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Source of the proposer's wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> EpochSecs;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EpochSecs {
        chrono::Utc::now().timestamp()
    }
}

/// Arguments of a create.
#[derive(Debug, Clone, Default)]
pub struct CreateInodeRequest {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Required for symbolic links, rejected otherwise.
    pub target: Option<Vec<u8>>,
}

/// One metadata partition as served by this replica.
pub struct MetaPartition {
    config: PartitionConfig,
    store: Arc<InodeStore>,
    allocator: Arc<InodeIdAllocator>,
    log: Arc<dyn ReplicatedLog<ApplyResult>>,
    clock: Arc<dyn Clock>,
}

impl MetaPartition {
    /// Serve `state_machine`'s store, proposing mutations through `log`.
    ///
    /// `log` must deliver committed entries to `state_machine`.
    pub fn new(
        config: PartitionConfig,
        state_machine: &InodeStateMachine,
        log: Arc<dyn ReplicatedLog<ApplyResult>>,
    ) -> Self {
        Self {
            config,
            store: state_machine.store(),
            allocator: state_machine.allocator(),
            log,
            clock: Arc::new(SystemClock),
        }
    }

    /// Start a replica group on an in-process log, with this node as leader.
    ///
    /// `followers` extra empty replicas apply every entry alongside the leader.
    pub fn start(
        config: PartitionConfig,
        node_id: NodeId,
        followers: usize,
    ) -> (Self, LogHandle<ApplyResult>) {
        let leader = InodeStateMachine::new(&config);
        let replicas = (0..followers)
            .map(|_| InodeStateMachine::new(&config))
            .collect();
        Self::start_with(config, node_id, leader, replicas)
    }

    /// Start a replica group from existing state machines, e.g. restored from a snapshot.
    pub fn start_with(
        config: PartitionConfig,
        node_id: NodeId,
        leader: InodeStateMachine,
        followers: Vec<InodeStateMachine>,
    ) -> (Self, LogHandle<ApplyResult>) {
        let store = leader.store();
        let allocator = leader.allocator();
        let handle = LocalLog::spawn(node_id, leader, followers);
        let partition = Self {
            config,
            store,
            allocator,
            log: Arc::new(handle.clone()),
            clock: Arc::new(SystemClock),
        };
        (partition, handle)
    }

    /// Replace the proposer clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn partition_id(&self) -> PartitionId {
        self.config.partition_id
    }

    pub fn store(&self) -> &Arc<InodeStore> {
        &self.store
    }

    pub fn allocator(&self) -> &Arc<InodeIdAllocator> {
        &self.allocator
    }

    /// Propose `op` and wait for its local apply result, bounded by the propose timeout.
    async fn propose(&self, op: InodeOp) -> Result<ApplyResult> {
        let opcode = op.opcode();
        let data = op.encode()?;
        let timeout = self.config.propose_timeout;

        match tokio::time::timeout(timeout, self.log.propose(data)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    partition = self.config.partition_id,
                    op = %opcode,
                    timeout_ms = timeout.as_millis() as u64,
                    "Proposal did not commit in time"
                );
                Err(MetanodeError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Allocate an id and create a record for it.
    #[instrument(skip(self, req), fields(partition = self.config.partition_id))]
    pub async fn create_inode(&self, req: CreateInodeRequest) -> Result<Inode> {
        let file_type = FileType::from_mode(req.mode).ok_or_else(|| {
            MetanodeError::InvalidArgument(format!("Unsupported file type in mode {:o}", req.mode))
        })?;
        match (file_type, &req.target) {
            (FileType::Symlink, None) => {
                return Err(MetanodeError::InvalidArgument(
                    "Symlink requires a target".into(),
                ))
            }
            (FileType::RegularFile | FileType::Directory, Some(_)) => {
                return Err(MetanodeError::InvalidArgument(
                    "Only symlinks carry a target".into(),
                ))
            }
            _ => {}
        }

        // Exhaustion fails here, before anything reaches the log.
        let id = self.allocator.next()?;
        let inode = Inode::new(id, req.mode, req.uid, req.gid, req.target, self.clock.now());

        match self.propose(InodeOp::CreateInode { inode }).await? {
            ApplyResult::Created(inode) => {
                debug!(inode = inode.id, "Inode created");
                Ok(inode)
            }
            other => Err(rejected(id, other.status())),
        }
    }

    /// Drop one link. Returns the record as left by the unlink.
    pub async fn unlink_inode(&self, id: InodeId) -> Result<Inode> {
        let op = InodeOp::UnlinkInode {
            inode: id,
            now: self.clock.now(),
        };
        expect_inode(id, self.propose(op).await?)
    }

    /// Add one link. Returns the updated record.
    pub async fn create_link_inode(&self, id: InodeId) -> Result<Inode> {
        let op = InodeOp::CreateLinkInode {
            inode: id,
            now: self.clock.now(),
        };
        expect_inode(id, self.propose(op).await?)
    }

    /// Open the inode, returning the lease now held on it.
    pub async fn open(&self, id: InodeId) -> Result<Lease> {
        let now = self.clock.now();
        let expires = now.saturating_add(self.config.lease_duration.as_secs() as EpochSecs);
        let op = InodeOp::Open {
            inode: id,
            token: new_lease_token(),
            atime: now,
            expires,
        };

        match self.propose(op).await? {
            ApplyResult::Lease {
                status: OpStatus::Ok,
                lease: Some(lease),
            } => Ok(lease),
            other => Err(rejected(id, other.status())),
        }
    }

    /// Release the lease held under `token`. A stale token is not an error.
    pub async fn release_open(&self, id: InodeId, token: LeaseToken) -> Result<()> {
        let op = InodeOp::ReleaseOpen {
            inode: id,
            token,
            now: self.clock.now(),
        };
        expect_ok(id, self.propose(op).await?)
    }

    /// Remove the record if it has no links and no live lease; otherwise a deferred no-op.
    pub async fn evict_inode(&self, id: InodeId) -> Result<()> {
        let op = InodeOp::EvictInode {
            inode: id,
            now: self.clock.now(),
        };
        expect_ok(id, self.propose(op).await?)
    }

    /// Apply a JSON-encoded [`SetAttrRequest`].
    pub async fn set_attr(&self, payload: &[u8]) -> Result<()> {
        let req = SetAttrRequest::decode(payload)
            .map_err(|e| MetanodeError::InvalidArgument(format!("Bad SetAttr payload: {}", e)))?;
        let op = InodeOp::SetAttr {
            payload: payload.to_vec(),
        };
        expect_ok(req.inode, self.propose(op).await?)
    }

    /// Read one live record.
    pub fn inode_get(&self, id: InodeId) -> Result<Inode> {
        self.live(id).ok_or(MetanodeError::InodeNotFound(id))
    }

    /// Read several records, silently skipping missing and delete-marked ids.
    pub fn inode_get_batch(&self, ids: &[InodeId]) -> Vec<Inode> {
        ids.iter().filter_map(|&id| self.live(id)).collect()
    }

    /// The lease currently recorded on a live record, if any.
    pub fn inode_get_auth(&self, id: InodeId) -> Result<Option<Lease>> {
        self.inode_get(id).map(|inode| inode.lease)
    }

    /// Copy of the record taken under its read lock, unless delete-marked.
    fn live(&self, id: InodeId) -> Option<Inode> {
        let handle = self.store.get(id)?;
        let inode = handle.read();
        if inode.delete_mark {
            return None;
        }
        Some(inode.clone())
    }
}

/// Fresh non-zero lease token.
fn new_lease_token() -> LeaseToken {
    LeaseToken(rand::thread_rng().gen_range(1..=u64::MAX))
}

/// Error for an apply result that did not succeed.
fn rejected(id: InodeId, status: OpStatus) -> MetanodeError {
    match status {
        OpStatus::NotExist => MetanodeError::InodeNotFound(id),
        status => MetanodeError::Internal(format!(
            "Command for inode {} rejected by state machine: {}",
            id, status
        )),
    }
}

fn expect_inode(id: InodeId, result: ApplyResult) -> Result<Inode> {
    match result {
        ApplyResult::Inode {
            status: OpStatus::Ok,
            inode: Some(inode),
        } => Ok(inode),
        other => Err(rejected(id, other.status())),
    }
}

fn expect_ok(id: InodeId, result: ApplyResult) -> Result<()> {
    match result.status() {
        OpStatus::Ok => Ok(()),
        status => Err(rejected(id, status)),
    }
}
