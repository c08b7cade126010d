//! Retry utilities: backoff builders and transient-failure retry.
//!
//! Uses `backon` for exponential backoff with jitter. Only failures the
//! store classifies as transient are retried; everything else surfaces on
//! the first attempt.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::config::PersistenceRetryConfig;
use crate::interfaces::StoreError;

/// Backoff for persistence calls, built from configuration.
pub fn persistence_backoff(config: &PersistenceRetryConfig) -> ExponentialBuilder {
    config.backoff()
}

/// Run a store operation, retrying transient failures with `backoff`.
///
/// `operation` names the call in retry warnings.
pub async fn retry_transient<T, F, Fut>(
    backoff: ExponentialBuilder,
    operation: &str,
    call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    call.retry(backoff)
        .when(StoreError::is_transient)
        .notify(|err: &StoreError, dur: Duration| {
            warn!(operation = %operation, error = %err, delay = ?dur, "Persistence call failed, retrying");
        })
        .await
}

#[cfg(test)]
mod tests;
