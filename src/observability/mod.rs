//! Observability module for the metanode.
//!
//! Provides logging and metrics.

use crate::config::ObservabilityConfig;
use crate::error::{MetanodeError, OpStatus, Result};
use crate::metadata::Opcode;
use crate::types::{LogIndex, PartitionId, Term};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use ::tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| MetanodeError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| MetanodeError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Install the Prometheus recorder with its scrape listener on `metrics_addr`.
///
/// Must be called from within a tokio runtime.
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()
        .map_err(|e| {
            MetanodeError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

    register_metrics();
    info!(addr = %config.metrics_addr, "Metrics exporter listening");
    Ok(())
}

/// Register standard metrics.
fn register_metrics() {
    gauge!("metanode_log_term").set(0.0);
    gauge!("metanode_log_commit_index").set(0.0);
}

/// Record one command applied by the state machine.
pub fn record_apply(opcode: Opcode, status: OpStatus) {
    counter!(
        "metanode_apply_total",
        "op" => opcode.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// Record a reply handed to the wire layer.
pub fn record_reply(op: &'static str, status: OpStatus) {
    counter!(
        "metanode_replies_total",
        "op" => op,
        "status" => status.as_str()
    )
    .increment(1);
}

/// Update the live record count of a partition.
pub fn set_inode_count(partition: PartitionId, count: usize) {
    gauge!("metanode_partition_inodes", "partition" => partition.to_string()).set(count as f64);
}

/// Update log progress metrics.
pub fn update_log_metrics(term: Term, commit_index: LogIndex) {
    gauge!("metanode_log_term").set(term as f64);
    gauge!("metanode_log_commit_index").set(commit_index as f64);
}
