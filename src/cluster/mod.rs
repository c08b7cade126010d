//! Static cluster metadata built from configuration.
//!
//! Every cluster issues failover versions of the form
//! `initial_failover_version + n * failover_version_increment`, so the
//! remainder modulo the increment names the issuing cluster.

use std::collections::HashMap;

use crate::config::ClusterConfig;
use crate::interfaces::ClusterMetadata;

/// Errors detected while validating cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterConfigError {
    #[error("Failover version increment must be positive, got {0}")]
    InvalidIncrement(i64),

    #[error("Cluster {name}: initial failover version {version} outside [0, {increment})")]
    InitialVersionOutOfRange {
        name: String,
        version: i64,
        increment: i64,
    },

    #[error("Clusters {first} and {second} share initial failover version {version}")]
    DuplicateInitialVersion {
        first: String,
        second: String,
        version: i64,
    },

    #[error("Current cluster {0} is not configured")]
    UnknownCurrentCluster(String),
}

/// Cluster metadata that never changes for the life of the process.
#[derive(Debug, Clone)]
pub struct StaticClusterMetadata {
    current_cluster: String,
    increment: i64,
    by_initial_version: HashMap<i64, String>,
}

impl StaticClusterMetadata {
    pub fn new(config: &ClusterConfig) -> Result<Self, ClusterConfigError> {
        let increment = config.failover_version_increment;
        if increment <= 0 {
            return Err(ClusterConfigError::InvalidIncrement(increment));
        }

        let mut by_initial_version: HashMap<i64, String> = HashMap::new();
        let mut names: Vec<_> = config.clusters.keys().collect();
        names.sort();
        for name in names {
            let version = config.clusters[name].initial_failover_version;
            if !(0..increment).contains(&version) {
                return Err(ClusterConfigError::InitialVersionOutOfRange {
                    name: name.clone(),
                    version,
                    increment,
                });
            }
            if let Some(first) = by_initial_version.get(&version) {
                return Err(ClusterConfigError::DuplicateInitialVersion {
                    first: first.clone(),
                    second: name.clone(),
                    version,
                });
            }
            by_initial_version.insert(version, name.clone());
        }

        if !config.clusters.contains_key(&config.current_cluster) {
            return Err(ClusterConfigError::UnknownCurrentCluster(
                config.current_cluster.clone(),
            ));
        }

        Ok(Self {
            current_cluster: config.current_cluster.clone(),
            increment,
            by_initial_version,
        })
    }

    pub fn failover_version_increment(&self) -> i64 {
        self.increment
    }
}

impl ClusterMetadata for StaticClusterMetadata {
    fn current_cluster(&self) -> &str {
        &self.current_cluster
    }

    fn is_version_from_same_cluster(&self, a: i64, b: i64) -> bool {
        a.rem_euclid(self.increment) == b.rem_euclid(self.increment)
    }

    fn cluster_name_for_version(&self, version: i64) -> Option<&str> {
        self.by_initial_version
            .get(&version.rem_euclid(self.increment))
            .map(String::as_str)
    }
}
