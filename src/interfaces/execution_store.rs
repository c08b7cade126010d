//! Durable execution storage interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::mutable_state::{MutableState, TimerTask};
use crate::identity::ExecutionKey;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
///
/// Timeouts, unavailability and throttling are transient and may be retried;
/// everything else is permanent for the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Execution not found: {what}")]
    NotFound { what: String },

    #[error("Condition failed: expected {expected}, actual {actual}")]
    ConditionFailed { expected: i64, actual: i64 },

    #[error("Current run mismatch for {workflow_id}: expected {expected}, actual {actual:?}")]
    CurrentRunMismatch {
        workflow_id: String,
        expected: Uuid,
        actual: Option<Uuid>,
    },

    #[error("Execution already exists: {key}")]
    AlreadyExists { key: String },

    #[error("Persistence timeout: {0}")]
    Timeout(String),

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    #[error("Persistence throttled: {0}")]
    Throttled(String),

    #[error("Persistence error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_) | StoreError::Unavailable(_) | StoreError::Throttled(_)
        )
    }

    /// Whether the write lost an optimistic concurrency race.
    pub fn is_condition_failed(&self) -> bool {
        matches!(
            self,
            StoreError::ConditionFailed { .. } | StoreError::CurrentRunMismatch { .. }
        )
    }
}

/// How an update interacts with the workflow's current-run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// The run must be the current run; the current-run record is kept in step.
    UpdateCurrent,
    /// The run must not be the current run (zombie); the record is untouched.
    BypassCurrent,
}

/// A loaded execution with its optimistic concurrency token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedExecution {
    pub state: MutableState,
    pub condition: i64,
}

/// Conditional write of a whole execution.
#[derive(Debug, Clone)]
pub struct UpdateExecutionRequest {
    pub key: ExecutionKey,
    pub state: MutableState,
    pub timer_tasks: Vec<TimerTask>,
    pub mode: UpdateMode,
    /// Token observed at load; the write fails if storage has moved on.
    pub expected_condition: i64,
}

/// Interface for workflow execution persistence.
///
/// Implementations:
/// - `MemoryExecutionStore`: in-memory store for tests and tooling
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Look up the run id of the workflow's current run.
    async fn get_current_run_id(
        &self,
        domain_id: &str,
        domain_name: &str,
        workflow_id: &str,
    ) -> Result<Uuid>;

    /// Load one run's mutable state.
    async fn load_execution(&self, key: &ExecutionKey) -> Result<PersistedExecution>;

    /// Write a run's state if its token still matches.
    ///
    /// Returns the new token.
    async fn update_execution(&self, request: UpdateExecutionRequest) -> Result<i64>;

    /// Create a run and make it current.
    ///
    /// Returns the initial token.
    async fn create_execution(&self, state: MutableState) -> Result<i64>;
}
