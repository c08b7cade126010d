//! Metrics sink implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::interfaces::{MetricCounter, MetricScope, MetricTimer, MetricsSink};

#[cfg(feature = "otel")]
mod otel;

#[cfg(feature = "otel")]
pub use otel::OtelMetrics;

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr_counter(&self, _scope: MetricScope, _counter: MetricCounter) {}

    fn record_timer(&self, _scope: MetricScope, _timer: MetricTimer, _elapsed: Duration) {}
}

/// Keeps counts in memory. Useful for assertions in tests and for the replay tool.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<(MetricScope, MetricCounter), u64>>,
    timers: Mutex<HashMap<(MetricScope, MetricTimer), Vec<Duration>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, scope: MetricScope, counter: MetricCounter) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(scope, counter))
            .copied()
            .unwrap_or(0)
    }

    pub fn timer_samples(&self, scope: MetricScope, timer: MetricTimer) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(scope, timer))
            .map_or(0, Vec::len)
    }

    /// All non-zero counters as `scope.counter` → value, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = counters
            .iter()
            .map(|((scope, counter), value)| {
                (format!("{}.{}", scope.as_str(), counter.as_str()), *value)
            })
            .collect();
        out.sort();
        out
    }
}

impl MetricsSink for InMemoryMetrics {
    fn incr_counter(&self, scope: MetricScope, counter: MetricCounter) {
        *self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((scope, counter))
            .or_default() += 1;
    }

    fn record_timer(&self, scope: MetricScope, timer: MetricTimer, elapsed: Duration) {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((scope, timer))
            .or_default()
            .push(elapsed);
    }
}

/// Records request count on creation and latency when dropped.
pub(crate) struct Stopwatch {
    sink: Arc<dyn MetricsSink>,
    scope: MetricScope,
    started: Instant,
}

impl Stopwatch {
    pub(crate) fn start(sink: &Arc<dyn MetricsSink>, scope: MetricScope) -> Self {
        sink.incr_counter(scope, MetricCounter::Requests);
        Self {
            sink: Arc::clone(sink),
            scope,
            started: Instant::now(),
        }
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        self.sink
            .record_timer(self.scope, MetricTimer::Latency, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_metrics_counts() {
        let metrics = InMemoryMetrics::new();
        metrics.incr_counter(MetricScope::SyncActivity, MetricCounter::Applied);
        metrics.incr_counter(MetricScope::SyncActivity, MetricCounter::Applied);
        assert_eq!(
            metrics.counter(MetricScope::SyncActivity, MetricCounter::Applied),
            2
        );
        assert_eq!(
            metrics.counter(MetricScope::SyncActivity, MetricCounter::Skipped),
            0
        );
        assert_eq!(
            metrics.snapshot(),
            vec![("replication.sync_activity.applied".to_string(), 2)]
        );
    }

    #[test]
    fn test_stopwatch_records_request_and_latency() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let sink: Arc<dyn MetricsSink> = metrics.clone();
        {
            let _sw = Stopwatch::start(&sink, MetricScope::CacheGetOrCreate);
        }
        assert_eq!(
            metrics.counter(MetricScope::CacheGetOrCreate, MetricCounter::Requests),
            1
        );
        assert_eq!(
            metrics.timer_samples(MetricScope::CacheGetOrCreate, MetricTimer::Latency),
            1
        );
    }
}
