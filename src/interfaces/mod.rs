//! Abstract interfaces for replicore collaborators.
//!
//! These traits define the contracts for:
//! - Execution storage (persistence)
//! - Domain directory (domain registry lookups)
//! - Cluster metadata (failover version ownership)
//! - Metrics sink (counters and timers)
//!
//! Every component receives its collaborators through its constructor.

pub mod cluster_metadata;
pub mod domain_directory;
pub mod execution_store;
pub mod metrics_sink;

pub use cluster_metadata::ClusterMetadata;
pub use domain_directory::{DomainDirectory, DomainError};
pub use execution_store::{
    ExecutionStore, PersistedExecution, StoreError, UpdateExecutionRequest, UpdateMode,
};
pub use metrics_sink::{MetricCounter, MetricScope, MetricTimer, MetricsSink};
