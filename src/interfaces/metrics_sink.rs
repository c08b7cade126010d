//! Metrics sink interface.
//!
//! Fire-and-forget: recording never fails and never affects control flow.

use std::time::Duration;

/// Operation a metric is recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricScope {
    CacheGetOrCreate,
    CacheGetOrCreateCurrent,
    CacheGetAndCreate,
    CacheGetCurrentExecution,
    SyncActivity,
}

impl MetricScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheGetOrCreate => "cache.get_or_create",
            Self::CacheGetOrCreateCurrent => "cache.get_or_create_current",
            Self::CacheGetAndCreate => "cache.get_and_create",
            Self::CacheGetCurrentExecution => "cache.get_current_execution",
            Self::SyncActivity => "replication.sync_activity",
        }
    }
}

/// Counter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricCounter {
    Requests,
    Failures,
    CacheMiss,
    AcquireLockFailed,
    CacheFull,
    Evictions,
    Applied,
    Skipped,
    Discarded,
    Dropped,
    ResendRequested,
}

impl MetricCounter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Failures => "failures",
            Self::CacheMiss => "cache_miss",
            Self::AcquireLockFailed => "acquire_lock_failed",
            Self::CacheFull => "cache_full",
            Self::Evictions => "evictions",
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Discarded => "discarded",
            Self::Dropped => "dropped",
            Self::ResendRequested => "resend_requested",
        }
    }
}

/// Timer names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricTimer {
    Latency,
}

impl MetricTimer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latency => "latency",
        }
    }
}

/// Destination for counters and timers.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, scope: MetricScope, counter: MetricCounter);

    fn record_timer(&self, scope: MetricScope, timer: MetricTimer, elapsed: Duration);
}
