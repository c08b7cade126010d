//! In-memory execution store.
//!
//! Used by tests and the replay tool. Mirrors the semantics a durable
//! backend must provide: a current-run record per workflow, a condition
//! token per run that advances on every successful write, and update modes
//! that check the current-run record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::execution::mutable_state::{MutableState, TimerTask, WorkflowState};
use crate::identity::ExecutionKey;
use crate::interfaces::execution_store::Result;
use crate::interfaces::{
    ExecutionStore, PersistedExecution, StoreError, UpdateExecutionRequest, UpdateMode,
};

/// Condition token assigned to newly created runs.
pub const INITIAL_CONDITION: i64 = 1;

/// Key for the current-run record: (domain_id, workflow_id).
type WorkflowKey = (String, String);

struct StoredExecution {
    state: MutableState,
    condition: i64,
    timer_tasks: Vec<TimerTask>,
}

#[derive(Default)]
struct Tables {
    executions: HashMap<ExecutionKey, StoredExecution>,
    current_runs: HashMap<WorkflowKey, Uuid>,
}

/// Execution store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryExecutionStore {
    tables: RwLock<Tables>,
    transient_failures: RwLock<usize>,
    fail_on_update: RwLock<bool>,
    current_run_lookups: AtomicUsize,
    loads: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a run directly, bypassing the create path.
    ///
    /// Non-zombie runs become the workflow's current run. Returns the
    /// condition token.
    pub async fn seed(&self, state: MutableState) -> i64 {
        let key = state.key();
        let mut tables = self.tables.write().await;
        if state.execution_info.state != WorkflowState::Zombie {
            tables
                .current_runs
                .insert((key.domain_id.clone(), key.workflow_id.clone()), key.run_id);
        }
        tables.executions.insert(
            key,
            StoredExecution {
                state,
                condition: INITIAL_CONDITION,
                timer_tasks: Vec::new(),
            },
        );
        INITIAL_CONDITION
    }

    pub async fn set_current_run(&self, domain_id: &str, workflow_id: &str, run_id: Uuid) {
        self.tables
            .write()
            .await
            .current_runs
            .insert((domain_id.to_string(), workflow_id.to_string()), run_id);
    }

    /// Snapshot of a stored run, bypassing fault injection and counters.
    pub async fn get_stored(&self, key: &ExecutionKey) -> Option<PersistedExecution> {
        self.tables
            .read()
            .await
            .executions
            .get(key)
            .map(|stored| PersistedExecution {
                state: stored.state.clone(),
                condition: stored.condition,
            })
    }

    /// Timer tasks written for a run, in write order.
    pub async fn timer_tasks(&self, key: &ExecutionKey) -> Vec<TimerTask> {
        self.tables
            .read()
            .await
            .executions
            .get(key)
            .map(|stored| stored.timer_tasks.clone())
            .unwrap_or_default()
    }

    /// Fail the next `count` calls of any kind with a transient error.
    pub async fn fail_next_transient(&self, count: usize) {
        *self.transient_failures.write().await = count;
    }

    /// Fail every update with a permanent error.
    pub async fn set_fail_on_update(&self, fail: bool) {
        *self.fail_on_update.write().await = fail;
    }

    pub fn current_run_lookups(&self) -> usize {
        self.current_run_lookups.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    async fn take_transient_failure(&self) -> Result<()> {
        let mut remaining = self.transient_failures.write().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn get_current_run_id(
        &self,
        domain_id: &str,
        _domain_name: &str,
        workflow_id: &str,
    ) -> Result<Uuid> {
        self.current_run_lookups.fetch_add(1, Ordering::SeqCst);
        self.take_transient_failure().await?;

        self.tables
            .read()
            .await
            .current_runs
            .get(&(domain_id.to_string(), workflow_id.to_string()))
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("current run of {}/{}", domain_id, workflow_id),
            })
    }

    async fn load_execution(&self, key: &ExecutionKey) -> Result<PersistedExecution> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.take_transient_failure().await?;

        self.get_stored(key).await.ok_or_else(|| StoreError::NotFound {
            what: key.to_string(),
        })
    }

    async fn update_execution(&self, request: UpdateExecutionRequest) -> Result<i64> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.take_transient_failure().await?;
        if *self.fail_on_update.read().await {
            return Err(StoreError::Internal("injected update failure".to_string()));
        }

        let mut tables = self.tables.write().await;
        let key = request.key;
        let current = tables
            .current_runs
            .get(&(key.domain_id.clone(), key.workflow_id.clone()))
            .copied();

        let is_current = current == Some(key.run_id);
        let mode_ok = match request.mode {
            UpdateMode::UpdateCurrent => is_current,
            UpdateMode::BypassCurrent => !is_current,
        };
        if !mode_ok {
            return Err(StoreError::CurrentRunMismatch {
                workflow_id: key.workflow_id.clone(),
                expected: key.run_id,
                actual: current,
            });
        }

        let stored = tables
            .executions
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound {
                what: key.to_string(),
            })?;
        if stored.condition != request.expected_condition {
            return Err(StoreError::ConditionFailed {
                expected: request.expected_condition,
                actual: stored.condition,
            });
        }

        stored.state = request.state;
        stored.timer_tasks.extend(request.timer_tasks);
        stored.condition += 1;
        Ok(stored.condition)
    }

    async fn create_execution(&self, state: MutableState) -> Result<i64> {
        self.take_transient_failure().await?;

        let key = state.key();
        let mut tables = self.tables.write().await;
        if tables.executions.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        tables
            .current_runs
            .insert((key.domain_id.clone(), key.workflow_id.clone()), key.run_id);
        tables.executions.insert(
            key,
            StoredExecution {
                state,
                condition: INITIAL_CONDITION,
                timer_tasks: Vec::new(),
            },
        );
        Ok(INITIAL_CONDITION)
    }
}

#[cfg(test)]
mod tests;
