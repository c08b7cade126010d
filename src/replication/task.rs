//! Replicated activity progress task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{RunSelector, WorkflowIdentity};
use crate::version_history::VersionHistory;

/// Activity progress replicated from the region that is running the activity.
///
/// Sent when an activity with a retry policy starts or heartbeats. Completion
/// and failure travel as regular history events, not as this task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncActivityTask {
    pub domain_id: String,
    pub workflow_id: String,
    /// Raw run id; empty means the current run.
    #[serde(default)]
    pub run_id: String,
    /// Version of the region that produced this progress.
    pub version: i64,
    /// Event id of the activity's scheduled event.
    pub scheduled_id: i64,
    pub scheduled_time: DateTime<Utc>,
    /// Event id of the started event, `None` while not started.
    #[serde(default)]
    pub started_id: Option<i64>,
    #[serde(default)]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_heartbeat_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Vec<u8>,
    pub attempt: i32,
    #[serde(default)]
    pub last_failure_reason: Option<String>,
    #[serde(default)]
    pub last_failure_details: Vec<u8>,
    #[serde(default)]
    pub last_worker_identity: String,
    /// Current branch of the source region's version history.
    pub version_history: VersionHistory,
}

impl SyncActivityTask {
    pub fn identity(&self) -> WorkflowIdentity {
        WorkflowIdentity::new(
            self.domain_id.clone(),
            self.workflow_id.clone(),
            RunSelector::from_raw(&self.run_id),
        )
    }

    /// Latest point in time this task reports on.
    pub fn event_time(&self) -> DateTime<Utc> {
        [self.started_time, self.last_heartbeat_time]
            .into_iter()
            .flatten()
            .fold(self.scheduled_time, |latest, t| latest.max(t))
    }
}
