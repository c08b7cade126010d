//! Replication of activity progress from peer regions.
//!
//! A sync-activity task carries the latest progress of an activity that is
//! running in another region. It is applied only when the local history
//! already contains the activity's scheduled event on the same lineage and
//! the progress is strictly newer than what is stored.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::execution::cache::{CacheError, ExecutionCache, ExecutionGuard};
use crate::execution::context::ContextError;
use crate::execution::mutable_state::{ActivityProgress, WorkflowState};
use crate::interfaces::{
    ClusterMetadata, MetricCounter, MetricScope, MetricsSink, StoreError, UpdateMode,
};
use crate::metrics::Stopwatch;
use crate::replication::conflict::{decide, needs_timer_reset, supersedes, Decision};
use crate::replication::{ReplicationError, RetryTaskHint, SkipReason, SyncActivityTask, SyncOutcome};
use crate::version_history::VersionHistoryError;

/// Applies [`SyncActivityTask`]s to locally cached executions.
pub struct ActivityReplicator {
    cache: Arc<ExecutionCache>,
    cluster: Arc<dyn ClusterMetadata>,
    metrics: Arc<dyn MetricsSink>,
}

impl ActivityReplicator {
    pub fn new(
        cache: Arc<ExecutionCache>,
        cluster: Arc<dyn ClusterMetadata>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            cache,
            cluster,
            metrics,
        }
    }

    /// Apply one task. Redelivering a task that was already applied is a
    /// no-op reported as [`SkipReason::Stale`].
    pub async fn sync_activity(
        &self,
        cancel: &CancellationToken,
        task: &SyncActivityTask,
    ) -> Result<SyncOutcome, ReplicationError> {
        let scope = MetricScope::SyncActivity;
        let _sw = Stopwatch::start(&self.metrics, scope);

        let result = self.acquire_and_apply(cancel, task).await;
        let counter = match &result {
            Ok(SyncOutcome::Applied) => MetricCounter::Applied,
            Ok(SyncOutcome::Skipped(_)) => MetricCounter::Skipped,
            Ok(SyncOutcome::Discarded) => MetricCounter::Discarded,
            Ok(SyncOutcome::Dropped) => MetricCounter::Dropped,
            Err(ReplicationError::ResendRequired(_)) => MetricCounter::ResendRequested,
            Err(_) => MetricCounter::Failures,
        };
        self.metrics.incr_counter(scope, counter);
        result
    }

    async fn acquire_and_apply(
        &self,
        cancel: &CancellationToken,
        task: &SyncActivityTask,
    ) -> Result<SyncOutcome, ReplicationError> {
        let mut guard = match self.cache.acquire(&task.identity(), cancel).await {
            Ok(guard) => guard,
            Err(CacheError::Store(StoreError::NotFound { what })) => {
                debug!(workflow_id = %task.workflow_id, missing = %what, "Workflow not found, dropping sync activity");
                return Ok(SyncOutcome::Dropped);
            }
            Err(e) => return Err(e.into()),
        };

        let result = self.apply(&mut guard, task).await;
        guard.release(result.is_err());
        result
    }

    async fn apply(
        &self,
        guard: &mut ExecutionGuard,
        task: &SyncActivityTask,
    ) -> Result<SyncOutcome, ReplicationError> {
        let key = guard.key().clone();

        let (decision, workflow_state) = {
            let state = match guard.load().await {
                Ok(state) => state,
                Err(ContextError::Store(StoreError::NotFound { .. })) => {
                    debug!(key = %key, "Execution not found, dropping sync activity");
                    return Ok(SyncOutcome::Dropped);
                }
                Err(e) => return Err(e.into()),
            };

            let workflow_state = state.execution_info.state;
            if workflow_state == WorkflowState::Completed {
                debug!(key = %key, "Workflow closed, skipping sync activity");
                return Ok(SyncOutcome::Skipped(SkipReason::WorkflowClosed));
            }

            let histories = state.version_histories.as_ref().ok_or_else(|| {
                error!(key = %key, "Execution has no version histories");
                ReplicationError::CorruptedHistory(format!("{key}: missing version histories"))
            })?;

            if task.version_history.is_empty() {
                return Err(ReplicationError::Validation(format!(
                    "{key}: empty incoming version history"
                )));
            }

            let decision = decide(histories, &task.version_history, task.scheduled_id)
                .map_err(|e| match e {
                    VersionHistoryError::NoJointPoint => {
                        warn!(key = %key, "Incoming version history shares no item with local");
                        ReplicationError::Validation(format!("{key}: {e}"))
                    }
                    e => {
                        error!(key = %key, error = %e, "Version history comparison failed");
                        ReplicationError::CorruptedHistory(format!("{key}: {e}"))
                    }
                })?;
            (decision, workflow_state)
        };

        match decision {
            Decision::Apply => {}
            Decision::Discard => {
                debug!(key = %key, version = task.version, "Local history wins, discarding sync activity");
                return Ok(SyncOutcome::Discarded);
            }
            Decision::RequestResend { event_id, version } => {
                info!(key = %key, event_id, version, "Missing history, requesting resend");
                return Err(ReplicationError::ResendRequired(RetryTaskHint {
                    domain_id: key.domain_id.clone(),
                    workflow_id: key.workflow_id.clone(),
                    run_id: key.run_id.to_string(),
                    start_event_id: event_id,
                    start_version: version,
                }));
            }
        }

        let Some(stored) = guard.activity_progress(task.scheduled_id)? else {
            debug!(key = %key, schedule_id = task.scheduled_id, "Activity not pending, dropping sync activity");
            return Ok(SyncOutcome::Dropped);
        };

        let incoming = ActivityProgress {
            version: task.version,
            attempt: task.attempt,
            last_heartbeat: task.last_heartbeat_time,
        };
        if !supersedes(&stored, &incoming) {
            debug!(key = %key, schedule_id = task.scheduled_id, "Stale activity progress, skipping");
            return Ok(SyncOutcome::Skipped(SkipReason::Stale));
        }

        let reset = needs_timer_reset(self.cluster.as_ref(), &stored, &incoming);
        guard.replicate_progress(task, reset)?;
        guard.create_next_activity_timer()?;

        let mode = if workflow_state == WorkflowState::Zombie {
            UpdateMode::BypassCurrent
        } else {
            UpdateMode::UpdateCurrent
        };
        guard.conditional_persist(task.event_time(), mode).await?;

        debug!(key = %key, schedule_id = task.scheduled_id, attempt = task.attempt, reset, "Applied sync activity");
        Ok(SyncOutcome::Applied)
    }
}
