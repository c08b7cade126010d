//! OpenTelemetry-backed metrics sink.
//!
//! Naming follows OTel semantic conventions (dot-separated); the scope is
//! attached as an attribute.

use std::collections::HashMap;
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::interfaces::{MetricCounter, MetricScope, MetricTimer, MetricsSink};

const COUNTERS: [MetricCounter; 11] = [
    MetricCounter::Requests,
    MetricCounter::Failures,
    MetricCounter::CacheMiss,
    MetricCounter::AcquireLockFailed,
    MetricCounter::CacheFull,
    MetricCounter::Evictions,
    MetricCounter::Applied,
    MetricCounter::Skipped,
    MetricCounter::Discarded,
    MetricCounter::Dropped,
    MetricCounter::ResendRequested,
];

/// Sink that forwards to instruments created from an injected `Meter`.
pub struct OtelMetrics {
    counters: HashMap<MetricCounter, Counter<u64>>,
    latency: Histogram<f64>,
}

impl OtelMetrics {
    pub fn new(meter: &Meter) -> Self {
        let counters = COUNTERS
            .iter()
            .map(|&counter| {
                let instrument = meter
                    .u64_counter(format!("replicore.{}", counter.as_str()))
                    .build();
                (counter, instrument)
            })
            .collect();

        let latency = meter
            .f64_histogram(format!("replicore.{}", MetricTimer::Latency.as_str()))
            .with_description("Operation latency")
            .with_unit("s")
            .build();

        Self { counters, latency }
    }
}

impl MetricsSink for OtelMetrics {
    fn incr_counter(&self, scope: MetricScope, counter: MetricCounter) {
        if let Some(instrument) = self.counters.get(&counter) {
            instrument.add(1, &[KeyValue::new("scope", scope.as_str())]);
        }
    }

    fn record_timer(&self, scope: MetricScope, _timer: MetricTimer, elapsed: Duration) {
        self.latency
            .record(elapsed.as_secs_f64(), &[KeyValue::new("scope", scope.as_str())]);
    }
}
