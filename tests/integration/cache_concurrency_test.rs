//! Concurrent access through the execution cache.

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use replicore::config::CacheConfig;

use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_are_mutually_exclusive() {
    let setup = setup(CacheConfig::default());
    let run_id = Uuid::new_v4();
    let wf = workflow_id(1);
    setup.store.seed(running_state(&wf, run_id)).await;

    let num_tasks = 8;
    let barrier = Arc::new(Barrier::new(num_tasks));
    let inside = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..num_tasks {
        let cache = setup.cache.clone();
        let barrier = barrier.clone();
        let inside = inside.clone();
        let identity = identity(&wf, run_id);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let cancel = CancellationToken::new();
            let mut guard = cache.acquire(&identity, &cancel).await.unwrap();

            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders at once");
            let state = guard.load().await.unwrap();
            let seen = state.next_event_id;
            tokio::time::sleep(Duration::from_millis(2)).await;
            state.next_event_id = seen + 1;
            inside.fetch_sub(1, Ordering::SeqCst);

            guard.release(false);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let cancel = CancellationToken::new();
    let mut guard = setup.cache.acquire(&identity(&wf, run_id), &cancel).await.unwrap();
    assert_eq!(guard.load().await.unwrap().next_event_id, 11 + num_tasks as i64);
    guard.release(false);

    assert_eq!(setup.store.load_count(), 1, "state should be loaded once and cached");
    assert_eq!(setup.cache.pin_count(&key(&wf, run_id)), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_holder_releases_and_discards_state() {
    let setup = setup(CacheConfig::default());
    let run_id = Uuid::new_v4();
    let wf = workflow_id(1);
    setup.store.seed(running_state(&wf, run_id)).await;

    let cache = setup.cache.clone();
    let target = identity(&wf, run_id);
    let result = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        let mut guard = cache.acquire(&target, &cancel).await.unwrap();
        guard.load().await.unwrap().next_event_id = 999;
        panic!("handler failed mid-mutation");
    })
    .await;
    assert!(result.unwrap_err().is_panic());

    assert_eq!(setup.cache.pin_count(&key(&wf, run_id)), Some(0));

    let cancel = CancellationToken::new();
    let mut guard = tokio::time::timeout(
        Duration::from_secs(1),
        setup.cache.acquire(&identity(&wf, run_id), &cancel),
    )
    .await
    .expect("lock should have been released")
    .unwrap();
    assert_eq!(guard.load().await.unwrap().next_event_id, 11);
    guard.release(false);
    assert_eq!(setup.store.load_count(), 2);
}

#[tokio::test]
async fn test_pinned_entry_survives_eviction_churn() {
    let config = CacheConfig {
        max_count: 2,
        ..CacheConfig::default()
    };
    let setup = setup(config);
    let pinned_run = Uuid::new_v4();
    let pinned_wf = workflow_id(0);
    setup.store.seed(running_state(&pinned_wf, pinned_run)).await;

    let cancel = CancellationToken::new();
    let mut pinned = setup
        .cache
        .acquire(&identity(&pinned_wf, pinned_run), &cancel)
        .await
        .unwrap();
    pinned.load().await.unwrap();

    for n in 1..=6 {
        let wf = workflow_id(n);
        let run_id = Uuid::new_v4();
        setup.store.seed(running_state(&wf, run_id)).await;

        let mut guard = setup.cache.acquire(&identity(&wf, run_id), &cancel).await.unwrap();
        guard.load().await.unwrap();
        guard.release(false);

        assert!(setup.cache.contains(&key(&pinned_wf, pinned_run)));
        assert!(setup.cache.len() <= 2);
    }

    assert!(pinned.is_loaded());
    pinned.release(false);
}
