//! Workflow identity types.
//!
//! A caller names a workflow with [`WorkflowIdentity`], which may refer to
//! "whatever run is current". The cache resolves that to an [`ExecutionKey`]
//! naming one concrete run before anything is looked up or locked.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which run of a workflow a caller means.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSelector {
    /// The workflow's current run, looked up in durable storage.
    Current,
    /// A specific run. Not yet validated; the cache rejects non-UUID values.
    Specific(String),
}

impl RunSelector {
    /// Convert a raw run id as it arrives on replication tasks.
    ///
    /// Wire payloads use the empty string for "current run".
    pub fn from_raw(run_id: &str) -> Self {
        if run_id.is_empty() {
            Self::Current
        } else {
            Self::Specific(run_id.to_string())
        }
    }
}

impl From<Uuid> for RunSelector {
    fn from(run_id: Uuid) -> Self {
        Self::Specific(run_id.to_string())
    }
}

/// A caller-supplied reference to a workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowIdentity {
    domain_id: String,
    workflow_id: String,
    run: RunSelector,
}

impl WorkflowIdentity {
    pub fn new(
        domain_id: impl Into<String>,
        workflow_id: impl Into<String>,
        run: RunSelector,
    ) -> Self {
        Self {
            domain_id: domain_id.into(),
            workflow_id: workflow_id.into(),
            run,
        }
    }

    /// Identity of the current run of `workflow_id`.
    pub fn current(domain_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self::new(domain_id, workflow_id, RunSelector::Current)
    }

    pub fn domain_id(&self) -> &str {
        &self.domain_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run(&self) -> &RunSelector {
        &self.run
    }
}

/// Fully resolved workflow execution key. The cache is keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionKey {
    pub domain_id: String,
    pub workflow_id: String,
    pub run_id: Uuid,
}

impl ExecutionKey {
    pub fn new(domain_id: impl Into<String>, workflow_id: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            domain_id: domain_id.into(),
            workflow_id: workflow_id.into(),
            run_id,
        }
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.domain_id, self.workflow_id, self.run_id)
    }
}
