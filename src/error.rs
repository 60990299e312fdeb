//! Error types for the metanode partition.
//!
//! This module provides a unified error type [`MetanodeError`] for all partition operations,
//! along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Replication**: the proposal was not seen to commit (no leader, timeout, log
//!   unavailable). The caller retries the whole operation.
//! - **Exhaustion**: the partition's inode range is consumed. Permanent until the range is
//!   reassigned.
//! - **Not found**: the target inode has no live record. An expected outcome.
//! - **Encoding / internal**: anything else, including a reply that could not be built
//!   after its command was already applied.
//!
//! Every variant maps onto one wire [`OpStatus`] via [`MetanodeError::status`].
//!
//! # Example
//!
//! ```rust
//! use metanode::error::{MetanodeError, OpStatus};
//!
//! let err = MetanodeError::NotLeader { leader: Some(3) };
//! assert!(err.is_retryable());
//! assert_eq!(err.status(), OpStatus::Retryable);
//!
//! let err = MetanodeError::InodeNotFound(42);
//! assert_eq!(err.status(), OpStatus::NotExist);
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Main error type for metanode operations.
#[derive(Error, Debug)]
pub enum MetanodeError {
    // Replication errors
    #[error("Not the leader. Leader is: {leader:?}")]
    NotLeader { leader: Option<u64> },

    #[error("Proposal timed out after {0}ms")]
    Timeout(u64),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Raft log error: {0}")]
    RaftLog(String),

    // Partition errors
    #[error("Inode id space exhausted for partition {partition} (range {start}..={end})")]
    IdSpaceExhausted { partition: u64, start: u64, end: u64 },

    #[error("Inode not found: {0}")]
    InodeNotFound(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetanodeError {
    /// Check if error is retryable.
    ///
    /// Retryable errors mean the command was not seen to commit; the caller retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetanodeError::NotLeader { .. } | MetanodeError::Timeout(_) | MetanodeError::Unavailable(_)
        )
    }

    /// Classify this error as a wire status.
    pub fn status(&self) -> OpStatus {
        match self {
            MetanodeError::InodeNotFound(_) => OpStatus::NotExist,
            MetanodeError::IdSpaceExhausted { .. } => OpStatus::IdSpaceExhausted,
            e if e.is_retryable() => OpStatus::Retryable,
            _ => OpStatus::InternalError,
        }
    }
}

impl From<bincode::Error> for MetanodeError {
    fn from(e: bincode::Error) -> Self {
        MetanodeError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for MetanodeError {
    fn from(e: serde_json::Error) -> Self {
        MetanodeError::Serialization(e.to_string())
    }
}

/// Status code handed to the wire translator with every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpStatus {
    Ok,
    NotExist,
    IdSpaceExhausted,
    Retryable,
    InternalError,
}

impl OpStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, OpStatus::Ok)
    }

    /// Stable lowercase name, used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Ok => "ok",
            OpStatus::NotExist => "not_exist",
            OpStatus::IdSpaceExhausted => "id_space_exhausted",
            OpStatus::Retryable => "retryable",
            OpStatus::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for metanode operations.
pub type Result<T> = std::result::Result<T, MetanodeError>;
