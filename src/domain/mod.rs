//! Fixed domain directory.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::interfaces::{DomainDirectory, DomainError};

/// One registered domain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DomainEntry {
    pub name: String,
    #[serde(default)]
    pub clusters: Vec<String>,
}

/// Domain directory backed by a map fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticDomainDirectory {
    domains: HashMap<String, DomainEntry>,
}

impl StaticDomainDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(
        mut self,
        domain_id: impl Into<String>,
        name: impl Into<String>,
        clusters: Vec<String>,
    ) -> Self {
        self.domains.insert(
            domain_id.into(),
            DomainEntry {
                name: name.into(),
                clusters,
            },
        );
        self
    }

    fn entry(&self, domain_id: &str) -> Result<&DomainEntry, DomainError> {
        self.domains
            .get(domain_id)
            .ok_or_else(|| DomainError::NotFound {
                domain_id: domain_id.to_string(),
            })
    }
}

impl From<HashMap<String, DomainEntry>> for StaticDomainDirectory {
    fn from(domains: HashMap<String, DomainEntry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl DomainDirectory for StaticDomainDirectory {
    async fn domain_name(&self, domain_id: &str) -> Result<String, DomainError> {
        Ok(self.entry(domain_id)?.name.clone())
    }

    async fn replication_clusters(&self, domain_id: &str) -> Result<Vec<String>, DomainError> {
        Ok(self.entry(domain_id)?.clusters.clone())
    }
}
