//! Command-line interface for the metanode.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Metanode - replicated inode metadata partition.
#[derive(Parser)]
#[command(name = "metanode")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "METANODE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "METANODE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Serve one partition on an in-process log until interrupted
    Serve {
        /// Override the configured node ID
        #[arg(short, long, env = "METANODE_NODE_ID")]
        node_id: Option<u64>,

        /// Restore partition state from this snapshot before serving
        #[arg(long)]
        restore: Option<PathBuf>,

        /// Write a snapshot here on shutdown
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },

    /// Load and validate a configuration file
    CheckConfig,

    /// Decode a partition snapshot and print its records as JSON
    InspectSnapshot {
        /// Snapshot file
        file: PathBuf,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect_snapshot() {
        let cli = Cli::try_parse_from(["metanode", "inspect-snapshot", "/tmp/p1.snap"]).unwrap();
        match cli.command {
            Commands::InspectSnapshot { file } => assert_eq!(file, PathBuf::from("/tmp/p1.snap")),
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_parse_serve_options() {
        let cli = Cli::try_parse_from([
            "metanode",
            "--config",
            "mn.json",
            "serve",
            "--node-id",
            "3",
            "--snapshot-out",
            "out.snap",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("mn.json")));
        match cli.command {
            Commands::Serve {
                node_id,
                restore,
                snapshot_out,
            } => {
                assert_eq!(node_id, Some(3));
                assert!(restore.is_none());
                assert_eq!(snapshot_out, Some(PathBuf::from("out.snap")));
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
