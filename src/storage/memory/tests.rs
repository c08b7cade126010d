use crate::version_history::{VersionHistories, VersionHistory};

use super::*;

fn state(run_id: Uuid) -> MutableState {
    let key = ExecutionKey::new("d-1", "wf-1", run_id);
    let history = VersionHistory::from_pairs(&[(5, 1)]).unwrap();
    MutableState::new(&key, VersionHistories::new(history), 6)
}

fn update(state: MutableState, mode: UpdateMode, expected_condition: i64) -> UpdateExecutionRequest {
    UpdateExecutionRequest {
        key: state.key(),
        state,
        timer_tasks: Vec::new(),
        mode,
        expected_condition,
    }
}

#[tokio::test]
async fn test_create_then_load() {
    let store = MemoryExecutionStore::new();
    let run_id = Uuid::new_v4();

    let condition = store.create_execution(state(run_id)).await.unwrap();
    assert_eq!(condition, INITIAL_CONDITION);

    let loaded = store
        .load_execution(&ExecutionKey::new("d-1", "wf-1", run_id))
        .await
        .unwrap();
    assert_eq!(loaded.condition, INITIAL_CONDITION);
    assert_eq!(loaded.state, state(run_id));
    assert_eq!(
        store.get_current_run_id("d-1", "orders", "wf-1").await,
        Ok(run_id)
    );
}

#[tokio::test]
async fn test_create_existing_fails() {
    let store = MemoryExecutionStore::new();
    let run_id = Uuid::new_v4();
    store.create_execution(state(run_id)).await.unwrap();

    assert!(matches!(
        store.create_execution(state(run_id)).await,
        Err(StoreError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_missing_current_run() {
    let store = MemoryExecutionStore::new();
    assert!(matches!(
        store.get_current_run_id("d-1", "orders", "wf-1").await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_update_advances_condition() {
    let store = MemoryExecutionStore::new();
    let run_id = Uuid::new_v4();
    let condition = store.seed(state(run_id)).await;

    let mut next = state(run_id);
    next.next_event_id = 9;
    let new_condition = store
        .update_execution(update(next.clone(), UpdateMode::UpdateCurrent, condition))
        .await
        .unwrap();

    assert_eq!(new_condition, condition + 1);
    let stored = store.get_stored(&next.key()).await.unwrap();
    assert_eq!(stored.state.next_event_id, 9);
    assert_eq!(stored.condition, new_condition);
}

#[tokio::test]
async fn test_update_with_stale_condition_fails() {
    let store = MemoryExecutionStore::new();
    let run_id = Uuid::new_v4();
    let condition = store.seed(state(run_id)).await;

    let err = store
        .update_execution(update(state(run_id), UpdateMode::UpdateCurrent, condition + 4))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StoreError::ConditionFailed {
            expected: condition + 4,
            actual: condition
        }
    );
    assert!(err.is_condition_failed());
}

#[tokio::test]
async fn test_update_modes_check_current_run() {
    let store = MemoryExecutionStore::new();
    let run_id = Uuid::new_v4();
    let condition = store.seed(state(run_id)).await;

    assert!(matches!(
        store
            .update_execution(update(state(run_id), UpdateMode::BypassCurrent, condition))
            .await,
        Err(StoreError::CurrentRunMismatch { .. })
    ));

    let newer = Uuid::new_v4();
    store.set_current_run("d-1", "wf-1", newer).await;

    assert!(matches!(
        store
            .update_execution(update(state(run_id), UpdateMode::UpdateCurrent, condition))
            .await,
        Err(StoreError::CurrentRunMismatch { actual: Some(actual), .. }) if actual == newer
    ));
    assert!(store
        .update_execution(update(state(run_id), UpdateMode::BypassCurrent, condition))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_seeded_zombie_is_not_current() {
    let store = MemoryExecutionStore::new();
    let mut zombie = state(Uuid::new_v4());
    zombie.execution_info.state = WorkflowState::Zombie;
    store.seed(zombie).await;

    assert!(store
        .get_current_run_id("d-1", "orders", "wf-1")
        .await
        .is_err());
}

#[tokio::test]
async fn test_transient_fault_injection() {
    let store = MemoryExecutionStore::new();
    let run_id = Uuid::new_v4();
    store.seed(state(run_id)).await;
    store.fail_next_transient(1).await;

    let err = store
        .get_current_run_id("d-1", "orders", "wf-1")
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(
        store.get_current_run_id("d-1", "orders", "wf-1").await,
        Ok(run_id)
    );
    assert_eq!(store.current_run_lookups(), 2);
}

#[tokio::test]
async fn test_fail_on_update() {
    let store = MemoryExecutionStore::new();
    let run_id = Uuid::new_v4();
    let condition = store.seed(state(run_id)).await;
    store.set_fail_on_update(true).await;

    let err = store
        .update_execution(update(state(run_id), UpdateMode::UpdateCurrent, condition))
        .await
        .unwrap_err();
    assert!(!err.is_transient());
    assert_eq!(store.update_count(), 1);
}
