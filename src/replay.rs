//! Offline replay of sync-activity tasks.
//!
//! A fixture seeds an in-memory store with executions and lists tasks to
//! push through the real cache and replicator. Each task yields one
//! [`ReplayRecord`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::{ClusterConfigError, StaticClusterMetadata};
use crate::config::Config;
use crate::domain::{DomainEntry, StaticDomainDirectory};
use crate::execution::cache::ExecutionCache;
use crate::execution::mutable_state::MutableState;
use crate::interfaces::MetricsSink;
use crate::replication::{
    ActivityReplicator, ErrorKind, RetryTaskHint, SyncActivityTask, SyncOutcome,
};
use crate::storage::MemoryExecutionStore;

/// Input to a replay run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplayFixture {
    /// Domain id → registry entry.
    pub domains: HashMap<String, DomainEntry>,
    pub executions: Vec<MutableState>,
    pub tasks: Vec<SyncActivityTask>,
}

/// Error half of a [`ReplayRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<RetryTaskHint>,
}

/// Result of replaying one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayRecord {
    pub index: usize,
    pub workflow_id: String,
    pub scheduled_id: i64,
    #[serde(flatten)]
    pub outcome: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplayFailure>,
}

/// Replay every task in `fixture`, in order.
pub async fn replay(
    fixture: ReplayFixture,
    config: &Config,
    metrics: Arc<dyn MetricsSink>,
) -> Result<Vec<ReplayRecord>, ClusterConfigError> {
    let cluster = StaticClusterMetadata::new(&config.cluster)?;

    let store = Arc::new(MemoryExecutionStore::new());
    for state in fixture.executions {
        store.seed(state).await;
    }

    let domains = StaticDomainDirectory::from(fixture.domains);
    let cache = ExecutionCache::new(
        config.cache.clone(),
        store,
        Arc::new(domains),
        Arc::clone(&metrics),
    )
    .with_retry(&config.persistence_retry);
    let replicator = ActivityReplicator::new(Arc::new(cache), Arc::new(cluster), metrics);

    let cancel = CancellationToken::new();
    let mut records = Vec::with_capacity(fixture.tasks.len());
    for (index, task) in fixture.tasks.iter().enumerate() {
        let result = replicator.sync_activity(&cancel, task).await;
        info!(index, workflow_id = %task.workflow_id, ok = result.is_ok(), "Replayed task");

        let (outcome, error) = match result {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => (
                None,
                Some(ReplayFailure {
                    kind: e.kind(),
                    message: e.to_string(),
                    hint: e.retry_hint().cloned(),
                }),
            ),
        };
        records.push(ReplayRecord {
            index,
            workflow_id: task.workflow_id.clone(),
            scheduled_id: task.scheduled_id,
            outcome,
            error,
        });
    }
    Ok(records)
}
