//! In-memory workflow mutable state.
//!
//! Holds the parts of a workflow execution the replication core reads and
//! writes: execution info, version histories, pending activities and the
//! timer tasks generated since the last persist.

use std::collections::BTreeMap;

use bitflags::bitflags;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::ExecutionKey;
use crate::replication::SyncActivityTask;
use crate::version_history::VersionHistories;

mod timer_sequence;

pub use timer_sequence::{ActivityTimeout, TimerTask};

/// Errors raised while mutating state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutableStateError {
    #[error("activity {schedule_id} not found")]
    ActivityNotFound { schedule_id: i64 },
}

/// Lifecycle state of a workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Created,
    Running,
    Completed,
    /// Run that lost a conflict and is no longer current. Writes must bypass
    /// the current-run record.
    Zombie,
}

/// Terminal outcome of a closed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStatus {
    #[default]
    None,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

/// Identity and lifecycle of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub domain_id: String,
    pub workflow_id: String,
    pub run_id: Uuid,
    #[serde(default)]
    pub state: WorkflowState,
    #[serde(default)]
    pub close_status: CloseStatus,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

bitflags! {
    /// Which activity timeout timers have already been created.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TimerTaskStatus: u32 {
        const START_TO_CLOSE = 1;
        const SCHEDULE_TO_START = 1 << 1;
        const SCHEDULE_TO_CLOSE = 1 << 2;
        const HEARTBEAT = 1 << 3;
    }
}

/// Progress fields compared when arbitrating replicated updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityProgress {
    pub version: i64,
    pub attempt: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// A scheduled activity that has not yet closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub version: i64,
    pub schedule_id: i64,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default)]
    pub started_id: Option<i64>,
    #[serde(default)]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_heartbeat_updated_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Vec<u8>,
    #[serde(default)]
    pub attempt: i32,
    #[serde(default)]
    pub last_failure_reason: Option<String>,
    #[serde(default)]
    pub last_failure_details: Vec<u8>,
    #[serde(default)]
    pub last_worker_identity: String,
    #[serde(default)]
    pub schedule_to_start_timeout_secs: u32,
    #[serde(default)]
    pub schedule_to_close_timeout_secs: u32,
    #[serde(default)]
    pub start_to_close_timeout_secs: u32,
    #[serde(default)]
    pub heartbeat_timeout_secs: u32,
    #[serde(default)]
    pub timer_task_status: TimerTaskStatus,
}

impl ActivityInfo {
    /// A freshly scheduled activity with no progress.
    pub fn scheduled(schedule_id: i64, version: i64, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            version,
            schedule_id,
            scheduled_time,
            started_id: None,
            started_time: None,
            last_heartbeat_updated_time: None,
            details: Vec::new(),
            attempt: 0,
            last_failure_reason: None,
            last_failure_details: Vec::new(),
            last_worker_identity: String::new(),
            schedule_to_start_timeout_secs: 0,
            schedule_to_close_timeout_secs: 0,
            start_to_close_timeout_secs: 0,
            heartbeat_timeout_secs: 0,
            timer_task_status: TimerTaskStatus::empty(),
        }
    }

    pub fn progress(&self) -> ActivityProgress {
        ActivityProgress {
            version: self.version,
            attempt: self.attempt,
            last_heartbeat: self.last_heartbeat_updated_time,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started_id.is_some()
    }

    fn estimated_size(&self) -> u64 {
        let fixed = std::mem::size_of::<Self>();
        let variable = self.details.len()
            + self.last_failure_details.len()
            + self.last_worker_identity.len()
            + self.last_failure_reason.as_ref().map_or(0, String::len);
        (fixed + variable) as u64
    }
}

/// Mutable state of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableState {
    pub execution_info: ExecutionInfo,
    /// `None` only for corrupted records.
    #[serde(default)]
    pub version_histories: Option<VersionHistories>,
    #[serde(default)]
    pub activities: BTreeMap<i64, ActivityInfo>,
    pub next_event_id: i64,
    /// Timer tasks created since the last persist.
    #[serde(skip)]
    pending_timer_tasks: Vec<TimerTask>,
}

impl MutableState {
    pub fn new(key: &ExecutionKey, version_histories: VersionHistories, next_event_id: i64) -> Self {
        Self {
            execution_info: ExecutionInfo {
                domain_id: key.domain_id.clone(),
                workflow_id: key.workflow_id.clone(),
                run_id: key.run_id,
                state: WorkflowState::Running,
                close_status: CloseStatus::None,
                last_updated: None,
            },
            version_histories: Some(version_histories),
            activities: BTreeMap::new(),
            next_event_id,
            pending_timer_tasks: Vec::new(),
        }
    }

    pub fn key(&self) -> ExecutionKey {
        ExecutionKey::new(
            self.execution_info.domain_id.clone(),
            self.execution_info.workflow_id.clone(),
            self.execution_info.run_id,
        )
    }

    pub fn workflow_state(&self) -> (WorkflowState, CloseStatus) {
        (self.execution_info.state, self.execution_info.close_status)
    }

    pub fn activity(&self, schedule_id: i64) -> Option<&ActivityInfo> {
        self.activities.get(&schedule_id)
    }

    pub fn insert_activity(&mut self, info: ActivityInfo) {
        self.activities.insert(info.schedule_id, info);
    }

    /// Overwrite an activity's progress with replicated values.
    ///
    /// Clears the timer task status when `reset_timer_task_status` is set so
    /// the next timer pass recreates timers from the new progress.
    pub fn replicate_activity_info(
        &mut self,
        task: &SyncActivityTask,
        reset_timer_task_status: bool,
    ) -> Result<(), MutableStateError> {
        let info = self.activities.get_mut(&task.scheduled_id).ok_or(
            MutableStateError::ActivityNotFound {
                schedule_id: task.scheduled_id,
            },
        )?;

        info.version = task.version;
        info.scheduled_time = task.scheduled_time;
        info.started_id = task.started_id;
        info.started_time = task.started_id.and(task.started_time);
        info.last_heartbeat_updated_time = task.last_heartbeat_time;
        info.details = task.details.clone();
        info.attempt = task.attempt;
        info.last_failure_reason = task.last_failure_reason.clone();
        info.last_failure_details = task.last_failure_details.clone();
        info.last_worker_identity = task.last_worker_identity.clone();
        if reset_timer_task_status {
            info.timer_task_status = TimerTaskStatus::empty();
        }
        Ok(())
    }

    /// Create the earliest activity timeout timer that is not yet created.
    pub fn create_next_activity_timer(&mut self) -> Option<TimerTask> {
        let task = timer_sequence::next_activity_timer(&mut self.activities)?;
        self.pending_timer_tasks.push(task.clone());
        Some(task)
    }

    pub fn pending_timer_tasks(&self) -> &[TimerTask] {
        &self.pending_timer_tasks
    }

    /// Drain timer tasks for persistence.
    pub fn take_pending_timer_tasks(&mut self) -> Vec<TimerTask> {
        std::mem::take(&mut self.pending_timer_tasks)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.execution_info.last_updated = Some(now);
    }

    /// Rough in-memory footprint, used by size-based cache admission.
    pub fn estimated_size(&self) -> u64 {
        let histories = self.version_histories.as_ref().map_or(0, |h| {
            h.iter()
                .map(|branch| {
                    branch.branch_token().len() as u64
                        + (branch.items().len() * std::mem::size_of::<i64>() * 2) as u64
                })
                .sum()
        });
        let activities: u64 = self.activities.values().map(ActivityInfo::estimated_size).sum();
        std::mem::size_of::<Self>() as u64
            + (self.execution_info.domain_id.len() + self.execution_info.workflow_id.len()) as u64
            + histories
            + activities
    }
}

fn add_secs(t: DateTime<Utc>, secs: u32) -> DateTime<Utc> {
    t + TimeDelta::seconds(i64::from(secs))
}
