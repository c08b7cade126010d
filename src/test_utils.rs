//! Builders shared by unit tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::config::{CacheConfig, PersistenceRetryConfig};
use crate::domain::StaticDomainDirectory;
use crate::execution::cache::ExecutionCache;
use crate::execution::mutable_state::{ActivityInfo, MutableState};
use crate::identity::{ExecutionKey, RunSelector, WorkflowIdentity};
use crate::metrics::InMemoryMetrics;
use crate::replication::SyncActivityTask;
use crate::storage::MemoryExecutionStore;
use crate::version_history::{VersionHistories, VersionHistory};

pub const DOMAIN_ID: &str = "domain-1";
pub const WORKFLOW_ID: &str = "wf-1";
pub const SCHEDULE_ID: i64 = 5;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn key(run_id: Uuid) -> ExecutionKey {
    ExecutionKey::new(DOMAIN_ID, WORKFLOW_ID, run_id)
}

pub fn identity(run_id: Uuid) -> WorkflowIdentity {
    WorkflowIdentity::new(DOMAIN_ID, WORKFLOW_ID, RunSelector::from(run_id))
}

pub fn history(pairs: &[(i64, i64)]) -> VersionHistory {
    VersionHistory::from_pairs(pairs).unwrap()
}

/// Running state with one scheduled activity at `SCHEDULE_ID`.
pub fn running_state(run_id: Uuid, pairs: &[(i64, i64)]) -> MutableState {
    let local = history(pairs);
    let last = local.last_item().unwrap();
    let mut state = MutableState::new(&key(run_id), VersionHistories::new(local), last.event_id + 1);
    state.insert_activity(ActivityInfo::scheduled(SCHEDULE_ID, last.version, at(0)));
    state
}

/// Sync task for `SCHEDULE_ID` carrying `pairs` as its history.
pub fn sync_task(run_id: Uuid, version: i64, attempt: i32, pairs: &[(i64, i64)]) -> SyncActivityTask {
    SyncActivityTask {
        domain_id: DOMAIN_ID.to_string(),
        workflow_id: WORKFLOW_ID.to_string(),
        run_id: run_id.to_string(),
        version,
        scheduled_id: SCHEDULE_ID,
        scheduled_time: at(0),
        started_id: Some(SCHEDULE_ID + 1),
        started_time: Some(at(5)),
        last_heartbeat_time: Some(at(30)),
        details: b"progress".to_vec(),
        attempt,
        last_failure_reason: None,
        last_failure_details: Vec::new(),
        last_worker_identity: "worker-1".to_string(),
        version_history: history(pairs),
    }
}

pub fn fast_retry() -> PersistenceRetryConfig {
    PersistenceRetryConfig {
        min_delay_ms: 1,
        max_delay_ms: 2,
        max_times: 3,
        jitter: false,
    }
}

pub struct Harness {
    pub cache: Arc<ExecutionCache>,
    pub store: Arc<MemoryExecutionStore>,
    pub metrics: Arc<InMemoryMetrics>,
}

pub fn harness(config: CacheConfig) -> Harness {
    let store = Arc::new(MemoryExecutionStore::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let domains = StaticDomainDirectory::new().with_domain(DOMAIN_ID, "orders", Vec::new());
    let cache = ExecutionCache::new(config, store.clone(), Arc::new(domains), metrics.clone())
        .with_retry(&fast_retry());
    Harness {
        cache: Arc::new(cache),
        store,
        metrics,
    }
}
