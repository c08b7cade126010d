//! Lockable handle to one workflow run's mutable state.
//!
//! An [`ExecutionContext`] is cheap to clone; every clone shares the same
//! state slot and lock. Only the holder of a [`LockedExecution`] may read or
//! mutate the state, and the state is loaded lazily from the store on first
//! use after creation or after [`LockedExecution::clear`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use backon::ExponentialBuilder;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::execution::mutable_state::{
    ActivityProgress, MutableState, MutableStateError, TimerTask,
};
use crate::identity::ExecutionKey;
use crate::interfaces::{ExecutionStore, StoreError, UpdateExecutionRequest, UpdateMode};
use crate::replication::SyncActivityTask;
use crate::utils::retry::retry_transient;

/// Errors raised by handle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("Lock acquisition cancelled for {0}")]
    Cancelled(ExecutionKey),

    #[error("Execution {0} is not locked")]
    NotLocked(ExecutionKey),

    #[error("Execution {0} is not loaded")]
    NotLoaded(ExecutionKey),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    MutableState(#[from] MutableStateError),
}

#[derive(Default)]
struct Slot {
    state: Option<MutableState>,
    condition: i64,
}

/// Shared handle to one run's state.
///
/// Loads and writes retry transient store failures with `backoff`.
#[derive(Clone)]
pub struct ExecutionContext {
    key: ExecutionKey,
    store: Arc<dyn ExecutionStore>,
    backoff: ExponentialBuilder,
    slot: Arc<Mutex<Slot>>,
    estimated_size: Arc<AtomicU64>,
}

impl ExecutionContext {
    pub fn new(
        key: ExecutionKey,
        store: Arc<dyn ExecutionStore>,
        backoff: ExponentialBuilder,
    ) -> Self {
        Self {
            key,
            store,
            backoff,
            slot: Arc::new(Mutex::new(Slot::default())),
            estimated_size: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn key(&self) -> &ExecutionKey {
        &self.key
    }

    /// Footprint of the loaded state as of the last load or persist.
    pub fn estimated_size(&self) -> u64 {
        self.estimated_size.load(Ordering::Relaxed)
    }

    /// Wait for exclusive access, giving up when `cancel` fires.
    pub async fn lock(&self, cancel: &CancellationToken) -> Result<LockedExecution, ContextError> {
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ContextError::Cancelled(self.key.clone()));
            }
            guard = Arc::clone(&self.slot).lock_owned() => guard,
        };

        Ok(LockedExecution {
            key: self.key.clone(),
            store: Arc::clone(&self.store),
            backoff: self.backoff.clone(),
            guard: Some(guard),
            estimated_size: Arc::clone(&self.estimated_size),
        })
    }
}

/// Exclusive access to a run's state.
///
/// Dropping it, or calling [`unlock`](Self::unlock), releases the lock.
pub struct LockedExecution {
    key: ExecutionKey,
    store: Arc<dyn ExecutionStore>,
    backoff: ExponentialBuilder,
    guard: Option<OwnedMutexGuard<Slot>>,
    estimated_size: Arc<AtomicU64>,
}

impl LockedExecution {
    pub fn key(&self) -> &ExecutionKey {
        &self.key
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.guard.as_ref().is_some_and(|slot| slot.state.is_some())
    }

    /// Condition token observed at the last load or persist.
    pub fn condition(&self) -> Option<i64> {
        self.guard
            .as_ref()
            .and_then(|slot| slot.state.as_ref().map(|_| slot.condition))
    }

    /// The loaded state, if any.
    pub fn state(&self) -> Option<&MutableState> {
        self.guard.as_ref().and_then(|slot| slot.state.as_ref())
    }

    /// Return the state, reading it from the store if not loaded.
    pub async fn load(&mut self) -> Result<&mut MutableState, ContextError> {
        let slot = self
            .guard
            .as_mut()
            .ok_or_else(|| ContextError::NotLocked(self.key.clone()))?;

        if slot.state.is_none() {
            let (store, key) = (&self.store, &self.key);
            let persisted = retry_transient(self.backoff.clone(), "load_execution", move || {
                store.load_execution(key)
            })
            .await?;
            debug!(key = %self.key, condition = persisted.condition, "Loaded execution");
            self.estimated_size
                .store(persisted.state.estimated_size(), Ordering::Relaxed);
            slot.condition = persisted.condition;
            slot.state = Some(persisted.state);
        }

        slot.state
            .as_mut()
            .ok_or_else(|| ContextError::NotLoaded(self.key.clone()))
    }

    /// Drop the in-memory state so the next `load` re-reads the store.
    pub fn clear(&mut self) {
        if let Some(slot) = self.guard.as_mut() {
            if slot.state.take().is_some() {
                debug!(key = %self.key, "Cleared execution");
            }
            slot.condition = 0;
            self.estimated_size.store(0, Ordering::Relaxed);
        }
    }

    /// Release the lock. Further operations fail with `NotLocked`.
    pub fn unlock(&mut self) {
        self.guard = None;
    }

    /// Progress of the activity at `schedule_id`, if it is pending.
    pub fn activity_progress(
        &self,
        schedule_id: i64,
    ) -> Result<Option<ActivityProgress>, ContextError> {
        Ok(self
            .loaded()?
            .activity(schedule_id)
            .map(|info| info.progress()))
    }

    /// Overwrite an activity's progress with a replicated update.
    pub fn replicate_progress(
        &mut self,
        task: &SyncActivityTask,
        reset_timer_task_status: bool,
    ) -> Result<(), ContextError> {
        self.loaded_mut()?
            .replicate_activity_info(task, reset_timer_task_status)?;
        Ok(())
    }

    /// Create the next activity timeout timer, if one is due to be created.
    pub fn create_next_activity_timer(&mut self) -> Result<Option<TimerTask>, ContextError> {
        Ok(self.loaded_mut()?.create_next_activity_timer())
    }

    /// Write the state back if the store has not moved on since load.
    ///
    /// On failure the in-memory state is cleared; it no longer matches the
    /// store and the next `load` must re-read it.
    pub async fn conditional_persist(
        &mut self,
        now: DateTime<Utc>,
        mode: UpdateMode,
    ) -> Result<i64, ContextError> {
        let (request, expected) = {
            let slot = self
                .guard
                .as_mut()
                .ok_or_else(|| ContextError::NotLocked(self.key.clone()))?;
            let condition = slot.condition;
            let state = slot
                .state
                .as_mut()
                .ok_or_else(|| ContextError::NotLoaded(self.key.clone()))?;
            state.touch(now);
            let timer_tasks = state.take_pending_timer_tasks();
            let request = UpdateExecutionRequest {
                key: self.key.clone(),
                state: state.clone(),
                timer_tasks,
                mode,
                expected_condition: condition,
            };
            (request, condition)
        };

        // A retried write that already landed fails its condition check.
        let store = &self.store;
        let result = retry_transient(self.backoff.clone(), "update_execution", move || {
            store.update_execution(request.clone())
        })
        .await;

        match result {
            Ok(condition) => {
                debug!(key = %self.key, expected, condition, ?mode, "Persisted execution");
                if let Some(slot) = self.guard.as_mut() {
                    slot.condition = condition;
                    if let Some(state) = slot.state.as_ref() {
                        self.estimated_size
                            .store(state.estimated_size(), Ordering::Relaxed);
                    }
                }
                Ok(condition)
            }
            Err(e) => {
                self.clear();
                Err(e.into())
            }
        }
    }

    fn loaded(&self) -> Result<&MutableState, ContextError> {
        let slot = self
            .guard
            .as_ref()
            .ok_or_else(|| ContextError::NotLocked(self.key.clone()))?;
        slot.state
            .as_ref()
            .ok_or_else(|| ContextError::NotLoaded(self.key.clone()))
    }

    fn loaded_mut(&mut self) -> Result<&mut MutableState, ContextError> {
        let slot = self
            .guard
            .as_mut()
            .ok_or_else(|| ContextError::NotLocked(self.key.clone()))?;
        slot.state
            .as_mut()
            .ok_or_else(|| ContextError::NotLoaded(self.key.clone()))
    }
}
