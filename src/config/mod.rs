//! Configuration module for the metanode.

use crate::error::{MetanodeError, Result};
use crate::types::{InodeId, NodeId, PartitionId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for a metanode replica.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetanodeConfig {
    /// Node configuration.
    pub node: NodeConfig,
    /// Partition served by this node.
    pub partition: PartitionConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl MetanodeConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MetanodeError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            MetanodeError::Config(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node.id == 0 {
            return Err(MetanodeError::InvalidConfig {
                field: "node.id".to_string(),
                reason: "Node ID must be non-zero".to_string(),
            });
        }

        self.partition.validate()
    }

    /// Create a minimal development configuration.
    pub fn development() -> Self {
        Self {
            node: NodeConfig {
                id: 1,
                name: "dev-metanode".to_string(),
            },
            partition: PartitionConfig {
                partition_id: 1,
                start: 1,
                end: 1 << 24,
                propose_timeout: Duration::from_secs(1),
                lease_duration: Duration::from_secs(30),
            },
            observability: ObservabilityConfig {
                metrics_enabled: false,
                log_level: "debug".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Node-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier.
    pub id: NodeId,
    /// Human-readable node name.
    pub name: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: "metanode".to_string(),
        }
    }
}

/// Metadata partition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Partition identifier.
    pub partition_id: PartitionId,
    /// First inode id owned by the partition.
    pub start: InodeId,
    /// Last inode id owned by the partition (inclusive).
    pub end: InodeId,
    /// How long a mutating proposal may wait for commit.
    #[serde(with = "humantime_serde")]
    pub propose_timeout: Duration,
    /// Lifetime granted to an open-handle lease.
    #[serde(with = "humantime_serde")]
    pub lease_duration: Duration,
}

impl PartitionConfig {
    /// Validate the partition range and timings.
    pub fn validate(&self) -> Result<()> {
        if self.start == 0 {
            return Err(MetanodeError::InvalidConfig {
                field: "partition.start".to_string(),
                reason: "Inode 0 is reserved".to_string(),
            });
        }

        if self.start > self.end {
            return Err(MetanodeError::InvalidConfig {
                field: "partition.end".to_string(),
                reason: format!("Range end {} precedes start {}", self.end, self.start),
            });
        }

        if self.propose_timeout.is_zero() {
            return Err(MetanodeError::InvalidConfig {
                field: "partition.propose_timeout".to_string(),
                reason: "Timeout must be non-zero".to_string(),
            });
        }

        if self.lease_duration.as_secs() == 0 {
            return Err(MetanodeError::InvalidConfig {
                field: "partition.lease_duration".to_string(),
                reason: "Lease duration must be at least one second".to_string(),
            });
        }

        Ok(())
    }

    /// Whether `id` falls inside this partition's range.
    pub fn contains(&self, id: InodeId) -> bool {
        id >= self.start && id <= self.end
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            partition_id: 1,
            start: 1,
            end: u64::MAX,
            propose_timeout: Duration::from_secs(3),
            lease_duration: Duration::from_secs(60),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metrics bind address.
    pub metrics_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            let minutes = m.parse::<u64>().map_err(|e| e.to_string())?;
            minutes
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration of {} minutes is too large", minutes))
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config_is_valid() {
        let config = MetanodeConfig::development();
        assert!(config.validate().is_ok());
        assert!(config.partition.contains(1));
        assert!(!config.partition.contains(0));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let mut config = MetanodeConfig::development();
        config.partition.start = 100;
        config.partition.end = 10;
        match config.validate() {
            Err(MetanodeError::InvalidConfig { field, .. }) => assert_eq!(field, "partition.end"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_zero_node_id() {
        let mut config = MetanodeConfig::development();
        config.node.id = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let json = r#"{
            "node": { "id": 3, "name": "mn-3" },
            "partition": {
                "partition_id": 7,
                "start": 1000,
                "end": 1999,
                "propose_timeout": "500ms",
                "lease_duration": "1m"
            }
        }"#;
        let config: MetanodeConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.partition.lease_duration, Duration::from_secs(60));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metanode.json");

        let mut config = MetanodeConfig::development();
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        let loaded = MetanodeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.partition.end, config.partition.end);
        assert_eq!(loaded.partition.propose_timeout, Duration::from_secs(1));

        config.partition.start = 0;
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        assert!(matches!(
            MetanodeConfig::from_file(&path),
            Err(MetanodeError::InvalidConfig { .. })
        ));
    }
}
