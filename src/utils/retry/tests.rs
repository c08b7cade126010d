use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

fn fast_backoff(max_times: usize) -> ExponentialBuilder {
    persistence_backoff(&PersistenceRetryConfig {
        min_delay_ms: 1,
        max_delay_ms: 2,
        max_times,
        jitter: false,
    })
}

#[tokio::test]
async fn test_retry_transient_recovers() {
    let calls = AtomicUsize::new(0);

    let result = retry_transient(fast_backoff(3), "test", || async {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(StoreError::Unavailable("down".to_string()))
        } else {
            Ok(7)
        }
    })
    .await;

    assert_eq!(result, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_transient_gives_up_after_max_times() {
    let calls = AtomicUsize::new(0);

    let result: Result<(), _> = retry_transient(fast_backoff(2), "test", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Timeout("slow".to_string()))
    })
    .await;

    assert_eq!(result, Err(StoreError::Timeout("slow".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_transient_surfaces_permanent_immediately() {
    let calls = AtomicUsize::new(0);

    let result: Result<(), _> = retry_transient(fast_backoff(5), "test", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::NotFound {
            what: "current run".to_string(),
        })
    })
    .await;

    assert!(matches!(result, Err(StoreError::NotFound { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_is_transient_classification() {
    assert!(StoreError::Timeout(String::new()).is_transient());
    assert!(StoreError::Unavailable(String::new()).is_transient());
    assert!(StoreError::Throttled(String::new()).is_transient());
    assert!(!StoreError::Internal(String::new()).is_transient());
    assert!(!StoreError::ConditionFailed {
        expected: 1,
        actual: 2
    }
    .is_transient());
}
