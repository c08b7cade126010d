//! Domain directory interface.

use async_trait::async_trait;

/// Errors returned by domain lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Domain not found: {domain_id}")]
    NotFound { domain_id: String },

    #[error("Domain directory unavailable: {0}")]
    Unavailable(String),
}

/// Resolves domain ids to their registry entries.
#[async_trait]
pub trait DomainDirectory: Send + Sync {
    /// Display name of the domain.
    async fn domain_name(&self, domain_id: &str) -> Result<String, DomainError>;

    /// Clusters the domain replicates to.
    async fn replication_clusters(&self, domain_id: &str) -> Result<Vec<String>, DomainError>;
}
