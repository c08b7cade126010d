//! Cluster group configuration.

use std::collections::HashMap;

use serde::Deserialize;

/// One cluster taking part in replication.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterInfo {
    /// Disabled clusters are kept for version attribution only.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Failover version this cluster starts from. Must be below the increment.
    pub initial_failover_version: i64,
}

fn default_enabled() -> bool {
    true
}

/// The cluster group this process belongs to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Step between successive failover versions of one cluster.
    pub failover_version_increment: i64,
    /// Name of the cluster this process runs in.
    pub current_cluster: String,
    /// All clusters by name.
    pub clusters: HashMap<String, ClusterInfo>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let mut clusters = HashMap::new();
        clusters.insert(
            "primary".to_string(),
            ClusterInfo {
                enabled: true,
                initial_failover_version: 0,
            },
        );
        Self {
            failover_version_increment: 10,
            current_cluster: "primary".to_string(),
            clusters,
        }
    }
}
