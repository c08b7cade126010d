//! Cross-region replication of workflow state.
//!
//! Replicated tasks are checked against the local version history before
//! anything is applied. Every failure is classified into a closed
//! [`ErrorKind`] so callers can dispatch with a single `match`.

use std::fmt;

use serde::Serialize;

use crate::execution::cache::CacheError;
use crate::execution::context::ContextError;
use crate::interfaces::{DomainError, StoreError};

pub mod activity;
pub mod conflict;
mod task;

pub use activity::ActivityReplicator;
pub use conflict::{decide, needs_timer_reset, supersedes, Decision};
pub use task::SyncActivityTask;

/// Closed classification of replication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed task; never retried.
    Validation,
    /// A collaborator does not know the referenced entity.
    NotFound,
    /// Caller's cancellation fired before the lock was acquired.
    Cancelled,
    /// Local history is missing events; fetch them and redeliver.
    ResendRequired,
    /// Local history is corrupted or absent; not retried.
    CorruptedHistory,
    /// Optimistic concurrency conflict on persist.
    ConditionFailed,
    /// Retrying later may succeed.
    Transient,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Cancelled => "cancelled",
            Self::ResendRequired => "resend_required",
            Self::CorruptedHistory => "corrupted_history",
            Self::ConditionFailed => "condition_failed",
            Self::Transient => "transient",
            Self::Internal => "internal",
        }
    }
}

/// Where the source region should resume sending events from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryTaskHint {
    pub domain_id: String,
    pub workflow_id: String,
    pub run_id: String,
    pub start_event_id: i64,
    pub start_version: i64,
}

impl fmt::Display for RetryTaskHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} from event {} at version {}",
            self.domain_id, self.workflow_id, self.run_id, self.start_event_id, self.start_version
        )
    }
}

/// Errors returned by replication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicationError {
    #[error("Invalid replication task: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Resend required: {0}")]
    ResendRequired(RetryTaskHint),

    #[error("Corrupted history: {0}")]
    CorruptedHistory(String),

    #[error("Condition failed: {0}")]
    ConditionFailed(StoreError),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::ResendRequired(_) => ErrorKind::ResendRequired,
            Self::CorruptedHistory(_) => ErrorKind::CorruptedHistory,
            Self::ConditionFailed(_) => ErrorKind::ConditionFailed,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The resend hint, when this is a resend request.
    pub fn retry_hint(&self) -> Option<&RetryTaskHint> {
        match self {
            Self::ResendRequired(hint) => Some(hint),
            _ => None,
        }
    }
}

impl From<StoreError> for ReplicationError {
    fn from(err: StoreError) -> Self {
        if err.is_condition_failed() {
            Self::ConditionFailed(err)
        } else if err.is_transient() {
            Self::Transient(err.to_string())
        } else if let StoreError::NotFound { what } = err {
            Self::NotFound(what)
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<DomainError> for ReplicationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { domain_id } => Self::NotFound(format!("domain {domain_id}")),
            DomainError::Unavailable(msg) => Self::Transient(msg),
        }
    }
}

impl From<CacheError> for ReplicationError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Validation(msg) => Self::Validation(msg),
            CacheError::Cancelled(key) => Self::Cancelled(key.to_string()),
            CacheError::LookupCancelled { .. } => Self::Cancelled(err.to_string()),
            CacheError::CacheFull { .. } => Self::Transient(err.to_string()),
            CacheError::Store(e) => e.into(),
            CacheError::Domain(e) => e.into(),
        }
    }
}

impl From<ContextError> for ReplicationError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled(key) => Self::Cancelled(key.to_string()),
            ContextError::Store(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Why a task was accepted without changing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The workflow has completed.
    WorkflowClosed,
    /// The stored progress is as new as the task's.
    Stale,
}

/// Successful result of processing a replication task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum SyncOutcome {
    /// Progress replicated and persisted.
    Applied,
    Skipped(SkipReason),
    /// Local history won the conflict.
    Discarded,
    /// The target workflow or activity no longer exists locally.
    Dropped,
}
