//! Metanode - the replicated inode state machine of a distributed filesystem.
//!
//! A metadata partition owns a contiguous range of inode ids and serves every
//! structural inode operation for it: create, link, unlink, attribute reads and writes,
//! open-handle leases and eviction. Mutations never touch the store directly; they are
//! proposed to a replicated command log and applied in log order on every replica.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  MetaPartition: operation handlers | Reply assembly           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ReplicatedLog: propose -> committed result                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  InodeStateMachine: apply dispatcher | snapshot / restore     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  InodeStore (per-record locks) | InodeIdAllocator             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use metanode::config::MetanodeConfig;
//! use metanode::metadata::{CreateInodeRequest, MetaPartition};
//!
//! #[tokio::main]
//! async fn main() -> metanode::Result<()> {
//!     let config = MetanodeConfig::development();
//!     let (partition, _log) = MetaPartition::start(config.partition, config.node.id, 2);
//!
//!     let inode = partition
//!         .create_inode(CreateInodeRequest { mode: 0o644, ..Default::default() })
//!         .await?;
//!     partition.open(inode.id).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod cli;
pub mod metadata;
pub mod observability;
pub mod raft;
pub mod shutdown;

// Re-exports
pub use error::{MetanodeError, OpStatus, Result};
pub use types::*;

use config::MetanodeConfig;
use metadata::{InodeStateMachine, MetaPartition};
use raft::StateMachine;
use std::path::PathBuf;
use tracing::{info, warn};

/// Startup and shutdown options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Snapshot to restore before serving.
    pub restore: Option<PathBuf>,
    /// Where to write a snapshot on shutdown.
    pub snapshot_out: Option<PathBuf>,
}

/// Serve the configured partition until a shutdown signal arrives.
pub async fn run(config: MetanodeConfig, options: ServeOptions) -> Result<()> {
    info!(
        node = %config.node.name,
        partition = config.partition.partition_id,
        start = config.partition.start,
        end = config.partition.end,
        "Starting metanode"
    );

    if config.observability.metrics_enabled {
        observability::install_metrics_exporter(&config.observability)?;
    }

    let mut leader = InodeStateMachine::new(&config.partition);
    if let Some(path) = &options.restore {
        let bytes = std::fs::read(path)?;
        leader.restore(&bytes)?;
        info!(
            path = %path.display(),
            inodes = leader.store().len(),
            "Partition restored from snapshot"
        );
    }

    let (partition, log) =
        MetaPartition::start_with(config.partition.clone(), config.node.id, leader, Vec::new());
    info!(
        partition = partition.partition_id(),
        remaining_ids = partition.allocator().remaining(),
        "Partition serving"
    );

    shutdown::wait_for_signal().await?;
    info!("Shutting down metanode gracefully...");

    if let Some(path) = &options.snapshot_out {
        match log.snapshot().await {
            Ok((index, bytes)) => {
                std::fs::write(path, &bytes)?;
                info!(path = %path.display(), index, "Snapshot written");
            }
            Err(e) => warn!(error = %e, "Failed to take shutdown snapshot"),
        }
    }

    log.shutdown().await?;
    info!("Metanode shutdown complete");
    Ok(())
}
