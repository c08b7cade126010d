//! Persistence retry configuration.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

/// Backoff applied to transient persistence failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceRetryConfig {
    /// Delay before the first retry.
    pub min_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Retries after the initial attempt.
    pub max_times: usize,
    /// Randomize delays to spread out concurrent retries.
    pub jitter: bool,
}

impl Default for PersistenceRetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 10_000,
            max_times: 5,
            jitter: true,
        }
    }
}

impl PersistenceRetryConfig {
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_times);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
