//! Replicated activity progress applied from several workers at once.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use replicore::config::CacheConfig;
use replicore::interfaces::{MetricCounter, MetricScope};
use replicore::replication::SkipReason;
use replicore::{ErrorKind, SyncOutcome};

use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redelivery_applies_once() {
    let setup = setup(CacheConfig::default());
    let run_id = Uuid::new_v4();
    let wf = workflow_id(1);
    setup.store.seed(running_state(&wf, run_id)).await;

    let num_tasks = 6;
    let barrier = Arc::new(Barrier::new(num_tasks));
    let mut handles = Vec::new();

    for _ in 0..num_tasks {
        let replicator = setup.replicator.clone();
        let barrier = barrier.clone();
        let task = sync_task(&wf, run_id, 1);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let cancel = CancellationToken::new();
            replicator.sync_activity(&cancel, &task).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let applied = outcomes
        .iter()
        .filter(|o| **o == SyncOutcome::Applied)
        .count();
    let stale = outcomes
        .iter()
        .filter(|o| **o == SyncOutcome::Skipped(SkipReason::Stale))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(stale, num_tasks - 1);
    assert_eq!(setup.store.update_count(), 1);
    assert_eq!(
        setup
            .metrics
            .counter(MetricScope::SyncActivity, MetricCounter::Applied),
        1
    );

    let stored = setup.store.get_stored(&key(&wf, run_id)).await.unwrap();
    assert_eq!(stored.state.activity(SCHEDULE_ID).unwrap().attempt, 1);
}

#[tokio::test]
async fn test_independent_workflows_do_not_block_each_other() {
    let setup = setup(CacheConfig::default());
    let held_run = Uuid::new_v4();
    let other_run = Uuid::new_v4();
    setup.store.seed(running_state(&workflow_id(1), held_run)).await;
    setup.store.seed(running_state(&workflow_id(2), other_run)).await;

    let cancel = CancellationToken::new();
    let mut held = setup
        .cache
        .acquire(&identity(&workflow_id(1), held_run), &cancel)
        .await
        .unwrap();

    let outcome = setup
        .replicator
        .sync_activity(&cancel, &sync_task(&workflow_id(2), other_run, 1))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Applied);

    held.release(false);
}

#[tokio::test]
async fn test_replication_waiting_on_lock_is_cancelled() {
    let setup = setup(CacheConfig::default());
    let run_id = Uuid::new_v4();
    let wf = workflow_id(1);
    setup.store.seed(running_state(&wf, run_id)).await;

    let holder_cancel = CancellationToken::new();
    let mut held = setup
        .cache
        .acquire(&identity(&wf, run_id), &holder_cancel)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let replicator = setup.replicator.clone();
    let task = sync_task(&wf, run_id, 1);
    let waiter = {
        let cancel = cancel.clone();
        tokio::spawn(async move { replicator.sync_activity(&cancel, &task).await })
    };
    tokio::task::yield_now().await;
    cancel.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(setup.cache.pin_count(&key(&wf, run_id)), Some(1));

    held.release(false);
    assert_eq!(setup.store.update_count(), 0);
}
