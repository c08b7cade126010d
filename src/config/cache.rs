//! Execution cache configuration.

use std::time::Duration;

use serde::Deserialize;

/// Admission and eviction settings for the execution cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries to pre-allocate.
    pub initial_capacity: usize,
    /// Maximum number of entries.
    pub max_count: usize,
    /// Weigh entries by estimated footprint instead of count alone.
    pub size_based: bool,
    /// Byte budget when `size_based` is set.
    pub max_size_bytes: u64,
    /// Idle time after which an unpinned entry expires.
    pub ttl_secs: u64,
    /// Bypass caching entirely (every acquire loads fresh state).
    pub disabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 128,
            max_count: 512,
            size_based: false,
            max_size_bytes: 64 * 1024 * 1024,
            ttl_secs: 3600,
            disabled: false,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
