//! Metanode CLI - Main entry point.

use anyhow::Context;
use metanode::cli::{Cli, Commands};
use metanode::config::MetanodeConfig;
use metanode::metadata::PartitionSnapshot;
use metanode::ServeOptions;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Serve {
            node_id,
            restore,
            snapshot_out,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(id) = node_id {
                config.node.id = id;
            }
            config.observability.log_level = cli.log_level;
            config.validate()?;

            metanode::observability::init(&config.observability)?;
            metanode::run(
                config,
                ServeOptions {
                    restore,
                    snapshot_out,
                },
            )
            .await?;
        }

        Commands::CheckConfig => {
            let config = load_config(cli.config.as_deref())?;
            let partition = &config.partition;
            println!("Configuration OK");
            println!("  node:      {} ({})", config.node.id, config.node.name);
            println!("  partition: {}", partition.partition_id);
            println!(
                "  range:     {}..={} ({} ids)",
                partition.start,
                partition.end,
                partition.end - partition.start + 1
            );
            println!("  propose timeout: {:?}", partition.propose_timeout);
            println!("  lease duration:  {:?}", partition.lease_duration);
        }

        Commands::InspectSnapshot { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read snapshot {}", file.display()))?;
            let snapshot = PartitionSnapshot::decode(&bytes)?;

            let report = json!({
                "partitionId": snapshot.partition_id,
                "appliedIndex": snapshot.applied_index,
                "highWaterMark": snapshot.high_water_mark,
                "inodes": snapshot.inodes,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Version => {
            println!("Metanode v{}", env!("CARGO_PKG_VERSION"));
            println!("Replicated inode metadata partition");
        }
    }

    Ok(())
}

/// Load the configuration file, or the development preset when none is given.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<MetanodeConfig> {
    match path {
        Some(path) => MetanodeConfig::from_file(path)
            .with_context(|| format!("Invalid configuration {}", path.display())),
        None => Ok(MetanodeConfig::development()),
    }
}
