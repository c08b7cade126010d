//! Cluster metadata interface.

/// Facts about the clusters taking part in replication.
pub trait ClusterMetadata: Send + Sync {
    /// Name of the cluster this process runs in.
    fn current_cluster(&self) -> &str;

    /// Whether two failover versions were issued by the same cluster.
    fn is_version_from_same_cluster(&self, a: i64, b: i64) -> bool;

    /// Cluster that issued `version`, if it is a known cluster.
    fn cluster_name_for_version(&self, version: i64) -> Option<&str>;
}
