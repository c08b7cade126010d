//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use replicore::cluster::StaticClusterMetadata;
use replicore::config::{CacheConfig, ClusterConfig, PersistenceRetryConfig};
use replicore::domain::StaticDomainDirectory;
use replicore::execution::mutable_state::{ActivityInfo, MutableState};
use replicore::metrics::InMemoryMetrics;
use replicore::storage::MemoryExecutionStore;
use replicore::version_history::{VersionHistories, VersionHistory};
use replicore::{
    ActivityReplicator, ExecutionCache, ExecutionKey, RunSelector, SyncActivityTask,
    WorkflowIdentity,
};

pub const DOMAIN_ID: &str = "domain-1";
pub const SCHEDULE_ID: i64 = 5;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn workflow_id(n: usize) -> String {
    format!("wf-{}", n)
}

pub fn key(workflow_id: &str, run_id: Uuid) -> ExecutionKey {
    ExecutionKey::new(DOMAIN_ID, workflow_id, run_id)
}

pub fn identity(workflow_id: &str, run_id: Uuid) -> WorkflowIdentity {
    WorkflowIdentity::new(DOMAIN_ID, workflow_id, RunSelector::from(run_id))
}

/// Running state at history `[(10, 1)]` with one scheduled activity.
pub fn running_state(workflow_id: &str, run_id: Uuid) -> MutableState {
    let history = VersionHistory::from_pairs(&[(10, 1)]).unwrap();
    let mut state = MutableState::new(&key(workflow_id, run_id), VersionHistories::new(history), 11);
    state.insert_activity(ActivityInfo::scheduled(SCHEDULE_ID, 1, at(0)));
    state
}

pub fn sync_task(workflow_id: &str, run_id: Uuid, attempt: i32) -> SyncActivityTask {
    SyncActivityTask {
        domain_id: DOMAIN_ID.to_string(),
        workflow_id: workflow_id.to_string(),
        run_id: run_id.to_string(),
        version: 1,
        scheduled_id: SCHEDULE_ID,
        scheduled_time: at(0),
        started_id: Some(SCHEDULE_ID + 1),
        started_time: Some(at(5)),
        last_heartbeat_time: Some(at(30)),
        details: Vec::new(),
        attempt,
        last_failure_reason: None,
        last_failure_details: Vec::new(),
        last_worker_identity: "worker-1".to_string(),
        version_history: VersionHistory::from_pairs(&[(10, 1)]).unwrap(),
    }
}

pub struct Setup {
    pub store: Arc<MemoryExecutionStore>,
    pub metrics: Arc<InMemoryMetrics>,
    pub cache: Arc<ExecutionCache>,
    pub replicator: Arc<ActivityReplicator>,
}

pub fn setup(cache_config: CacheConfig) -> Setup {
    let store = Arc::new(MemoryExecutionStore::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let domains = StaticDomainDirectory::new().with_domain(DOMAIN_ID, "orders", Vec::new());
    let retry = PersistenceRetryConfig {
        min_delay_ms: 1,
        max_delay_ms: 5,
        max_times: 3,
        jitter: false,
    };
    let cache = Arc::new(
        ExecutionCache::new(cache_config, store.clone(), Arc::new(domains), metrics.clone())
            .with_retry(&retry),
    );
    let cluster = StaticClusterMetadata::new(&ClusterConfig::default()).unwrap();
    let replicator = Arc::new(ActivityReplicator::new(
        cache.clone(),
        Arc::new(cluster),
        metrics.clone(),
    ));
    Setup {
        store,
        metrics,
        cache,
        replicator,
    }
}
