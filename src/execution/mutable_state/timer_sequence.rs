//! Activity timeout timer sequencing.
//!
//! Every pending activity has up to four timeouts. Only the earliest one
//! across the whole workflow needs a durable timer; when it fires the timer
//! processor re-runs this sequence to create the next one. The per-activity
//! `timer_task_status` bits record which timeouts already have a timer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{add_secs, ActivityInfo, TimerTaskStatus};

/// Kinds of activity timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTimeout {
    ScheduleToStart,
    ScheduleToClose,
    StartToClose,
    Heartbeat,
}

impl ActivityTimeout {
    fn status_bit(self) -> TimerTaskStatus {
        match self {
            Self::ScheduleToStart => TimerTaskStatus::SCHEDULE_TO_START,
            Self::ScheduleToClose => TimerTaskStatus::SCHEDULE_TO_CLOSE,
            Self::StartToClose => TimerTaskStatus::START_TO_CLOSE,
            Self::Heartbeat => TimerTaskStatus::HEARTBEAT,
        }
    }
}

/// A durable timer to be written alongside the next state update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTask {
    pub schedule_id: i64,
    pub timeout: ActivityTimeout,
    pub visibility_time: DateTime<Utc>,
    pub attempt: i32,
    pub version: i64,
}

struct Candidate {
    fire_at: DateTime<Utc>,
    schedule_id: i64,
    timeout: ActivityTimeout,
}

fn candidates(info: &ActivityInfo) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(4);
    let mut push = |fire_at, timeout| {
        out.push(Candidate {
            fire_at,
            schedule_id: info.schedule_id,
            timeout,
        })
    };

    if info.schedule_to_close_timeout_secs > 0 {
        push(
            add_secs(info.scheduled_time, info.schedule_to_close_timeout_secs),
            ActivityTimeout::ScheduleToClose,
        );
    }

    match info.started_time.filter(|_| info.is_started()) {
        None => {
            if info.schedule_to_start_timeout_secs > 0 {
                push(
                    add_secs(info.scheduled_time, info.schedule_to_start_timeout_secs),
                    ActivityTimeout::ScheduleToStart,
                );
            }
        }
        Some(started) => {
            if info.start_to_close_timeout_secs > 0 {
                push(
                    add_secs(started, info.start_to_close_timeout_secs),
                    ActivityTimeout::StartToClose,
                );
            }
            if info.heartbeat_timeout_secs > 0 {
                let last_beat = info
                    .last_heartbeat_updated_time
                    .map_or(started, |beat| beat.max(started));
                push(
                    add_secs(last_beat, info.heartbeat_timeout_secs),
                    ActivityTimeout::Heartbeat,
                );
            }
        }
    }
    out
}

/// Pick the earliest timeout across all activities and mark it created.
///
/// Returns `None` when there is nothing to time out or when the earliest
/// timeout already has a timer.
pub(super) fn next_activity_timer(activities: &mut BTreeMap<i64, ActivityInfo>) -> Option<TimerTask> {
    let first = activities
        .values()
        .flat_map(candidates)
        .min_by(|a, b| {
            a.fire_at
                .cmp(&b.fire_at)
                .then(a.schedule_id.cmp(&b.schedule_id))
                .then(a.timeout.cmp(&b.timeout))
        })?;

    let info = activities.get_mut(&first.schedule_id)?;
    let bit = first.timeout.status_bit();
    if info.timer_task_status.contains(bit) {
        return None;
    }
    info.timer_task_status.insert(bit);

    Some(TimerTask {
        schedule_id: first.schedule_id,
        timeout: first.timeout,
        visibility_time: first.fire_at,
        attempt: info.attempt,
        version: info.version,
    })
}
