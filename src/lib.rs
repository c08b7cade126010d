//! Replicore - durable execution core for multi-region workflows
//!
//! Serializes mutation of workflow executions within one process and
//! resolves replicated updates from peer regions against local version
//! history.
//!
//! ## Components
//! - [`version_history`]: branching event lineage and LCA computation
//! - [`execution`]: mutable state, lockable contexts and the execution cache
//! - [`replication`]: conflict decisions and the activity replicator
//! - [`interfaces`]: collaborator traits injected into the above

pub mod cluster;
pub mod config;
pub mod domain;
pub mod execution;
pub mod identity;
pub mod interfaces;
pub mod metrics;
pub mod replay;
pub mod replication;
pub mod storage;
pub mod utils;
pub mod version_history;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use execution::{CacheError, ExecutionCache, ExecutionGuard};
pub use identity::{ExecutionKey, RunSelector, WorkflowIdentity};
pub use replication::{
    ActivityReplicator, ErrorKind, ReplicationError, SyncActivityTask, SyncOutcome,
};
