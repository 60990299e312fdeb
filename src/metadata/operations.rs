//! Inode commands replicated through the log, and their apply results.

use crate::error::{OpStatus, Result};
use crate::types::{EpochSecs, Inode, InodeId, Lease, LeaseToken};
use serde::{Deserialize, Serialize};

/// Opcode of a replicated inode command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    CreateInode = 1,
    UnlinkInode = 2,
    CreateLinkInode = 3,
    Open = 4,
    ReleaseOpen = 5,
    EvictInode = 6,
    SetAttr = 7,
}

impl Opcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::CreateInode => "create_inode",
            Opcode::UnlinkInode => "unlink_inode",
            Opcode::CreateLinkInode => "create_link_inode",
            Opcode::Open => "open",
            Opcode::ReleaseOpen => "release_open",
            Opcode::EvictInode => "evict_inode",
            Opcode::SetAttr => "set_attr",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inode operations for the replicated state machine.
///
/// Every time-dependent value is filled in by the proposer so that all replicas apply
/// the same command identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeOp {
    CreateInode {
        inode: Inode,
    },
    UnlinkInode {
        inode: InodeId,
        now: EpochSecs,
    },
    CreateLinkInode {
        inode: InodeId,
        now: EpochSecs,
    },
    Open {
        inode: InodeId,
        token: LeaseToken,
        atime: EpochSecs,
        expires: EpochSecs,
    },
    ReleaseOpen {
        inode: InodeId,
        token: LeaseToken,
        now: EpochSecs,
    },
    EvictInode {
        inode: InodeId,
        now: EpochSecs,
    },
    /// Raw JSON-encoded [`SetAttrRequest`].
    SetAttr {
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },
}

impl InodeOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            InodeOp::CreateInode { .. } => Opcode::CreateInode,
            InodeOp::UnlinkInode { .. } => Opcode::UnlinkInode,
            InodeOp::CreateLinkInode { .. } => Opcode::CreateLinkInode,
            InodeOp::Open { .. } => Opcode::Open,
            InodeOp::ReleaseOpen { .. } => Opcode::ReleaseOpen,
            InodeOp::EvictInode { .. } => Opcode::EvictInode,
            InodeOp::SetAttr { .. } => Opcode::SetAttr,
        }
    }

    /// Encode for the log.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a committed log entry.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Attribute change carried by a SetAttr command. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAttrRequest {
    pub inode: InodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atime: Option<EpochSecs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<EpochSecs>,
}

impl SetAttrRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Overwrite the requested fields of `inode`. Mode changes keep the format bits.
    pub fn apply_to(&self, inode: &mut Inode) {
        if let Some(m) = self.mode {
            inode.set_permissions(m);
        }
        if let Some(u) = self.uid {
            inode.uid = u;
        }
        if let Some(g) = self.gid {
            inode.gid = g;
        }
        if let Some(s) = self.size {
            inode.size = s;
        }
        if let Some(a) = self.atime {
            inode.access_time = a;
        }
        if let Some(m) = self.mtime {
            inode.modify_time = m;
        }
    }
}

/// Result of applying one command, shaped per opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// CreateInode inserted this record.
    Created(Inode),
    /// Status plus the record as left by the command (Unlink, CreateLink).
    Inode {
        status: OpStatus,
        inode: Option<Inode>,
    },
    /// Status plus the lease now held (Open).
    Lease {
        status: OpStatus,
        lease: Option<Lease>,
    },
    /// Status only (ReleaseOpen, Evict, SetAttr, rejected commands).
    Status(OpStatus),
}

impl ApplyResult {
    pub fn status(&self) -> OpStatus {
        match self {
            ApplyResult::Created(_) => OpStatus::Ok,
            ApplyResult::Inode { status, .. }
            | ApplyResult::Lease { status, .. }
            | ApplyResult::Status(status) => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status().is_ok()
    }

    pub(crate) fn inode_missing() -> Self {
        ApplyResult::Inode {
            status: OpStatus::NotExist,
            inode: None,
        }
    }
}
