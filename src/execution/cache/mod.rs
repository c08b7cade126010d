//! Execution cache.
//!
//! Maps resolved execution keys to shared [`ExecutionContext`]s and hands
//! out exclusively locked [`ExecutionGuard`]s. An entry is pinned for as
//! long as anyone holds or waits for its lock; pinned entries are never
//! evicted. Unpinned entries leave the cache when idle past the TTL or when
//! the cache is over its count or size budget, least recently used first.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use backon::ExponentialBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{CacheConfig, PersistenceRetryConfig};
use crate::execution::context::{ExecutionContext, LockedExecution};
use crate::identity::{ExecutionKey, RunSelector, WorkflowIdentity};
use crate::interfaces::{
    DomainDirectory, DomainError, ExecutionStore, MetricCounter, MetricScope, MetricsSink,
    StoreError,
};
use crate::metrics::Stopwatch;
use crate::utils::retry::{persistence_backoff, retry_transient};

/// Errors returned by cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid workflow identity: {0}")]
    Validation(String),

    #[error("Acquisition cancelled for {0}")]
    Cancelled(ExecutionKey),

    #[error("Current run lookup cancelled for {domain_id}/{workflow_id}")]
    LookupCancelled {
        domain_id: String,
        workflow_id: String,
    },

    #[error("Cache full: {entries} entries pinned (max {max_count})")]
    CacheFull { entries: usize, max_count: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

struct CacheEntry {
    context: ExecutionContext,
    refcount: usize,
    last_access: Instant,
    /// Monotonic access order for LRU selection.
    access_seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.last_access) >= ttl)
    }
}

#[derive(Default)]
struct EntryTable {
    entries: HashMap<ExecutionKey, CacheEntry>,
    next_seq: u64,
}

impl EntryTable {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn total_size(&self) -> u64 {
        self.entries
            .values()
            .map(|entry| entry.context.estimated_size())
            .sum()
    }

    fn least_recently_used_unpinned(&self) -> Option<ExecutionKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.refcount == 0)
            .min_by_key(|(_, entry)| entry.access_seq)
            .map(|(key, _)| key.clone())
    }
}

struct CacheShared {
    config: CacheConfig,
    metrics: Arc<dyn MetricsSink>,
    table: Mutex<EntryTable>,
}

impl CacheShared {
    fn table(&self) -> MutexGuard<'_, EntryTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl(&self) -> Option<Duration> {
        (self.config.ttl_secs > 0).then(|| self.config.ttl())
    }

    fn is_over_budget(&self, table: &EntryTable, extra: usize) -> bool {
        if table.entries.len() + extra > self.config.max_count {
            return true;
        }
        self.config.size_based && table.total_size() > self.config.max_size_bytes
    }

    fn evict(&self, table: &mut EntryTable, key: &ExecutionKey, scope: MetricScope) {
        if table.entries.remove(key).is_some() {
            debug!(key = %key, "Evicted execution");
            self.metrics.incr_counter(scope, MetricCounter::Evictions);
        }
    }

    /// Remove expired entries, then least recently used ones, until the
    /// table plus `extra` new entries fits the budget. Returns whether it
    /// fits.
    fn make_room(&self, table: &mut EntryTable, extra: usize, scope: MetricScope) -> bool {
        let now = Instant::now();
        let ttl = self.ttl();
        let expired: Vec<_> = table
            .entries
            .iter()
            .filter(|(_, entry)| entry.refcount == 0 && entry.is_expired(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.evict(table, key, scope);
        }

        while self.is_over_budget(table, extra) {
            match table.least_recently_used_unpinned() {
                Some(key) => self.evict(table, &key, scope),
                None => return false,
            }
        }
        true
    }

    fn evict_if_expired(
        &self,
        table: &mut EntryTable,
        key: &ExecutionKey,
        now: Instant,
        scope: MetricScope,
    ) {
        let expired = table
            .entries
            .get(key)
            .is_some_and(|entry| entry.refcount == 0 && entry.is_expired(now, self.ttl()));
        if expired {
            self.evict(table, key, scope);
        }
    }

    /// Look up or insert the entry for `key` and pin it.
    fn pin(
        self: &Arc<Self>,
        key: &ExecutionKey,
        store: &Arc<dyn ExecutionStore>,
        backoff: &ExponentialBuilder,
        scope: MetricScope,
    ) -> Result<(ExecutionContext, EntryPin), CacheError> {
        let now = Instant::now();
        let mut table = self.table();
        self.evict_if_expired(&mut table, key, now, scope);

        if !table.entries.contains_key(key) {
            self.metrics.incr_counter(scope, MetricCounter::CacheMiss);
            if !self.make_room(&mut table, 1, scope) {
                self.metrics.incr_counter(scope, MetricCounter::CacheFull);
                warn!(key = %key, entries = table.entries.len(), "Execution cache full");
                return Err(CacheError::CacheFull {
                    entries: table.entries.len(),
                    max_count: self.config.max_count,
                });
            }
        }

        let seq = table.next_seq();
        let entry = table
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry {
                context: ExecutionContext::new(key.clone(), Arc::clone(store), backoff.clone()),
                refcount: 0,
                last_access: now,
                access_seq: seq,
            });
        Ok(self.pin_entry(entry, key, now, seq))
    }

    /// Pin `key` only if it is already cached and not expired.
    fn pin_cached(
        self: &Arc<Self>,
        key: &ExecutionKey,
        scope: MetricScope,
    ) -> Option<(ExecutionContext, EntryPin)> {
        let now = Instant::now();
        let mut table = self.table();
        self.evict_if_expired(&mut table, key, now, scope);
        let seq = table.next_seq();
        let entry = table.entries.get_mut(key)?;
        Some(self.pin_entry(entry, key, now, seq))
    }

    fn pin_entry(
        self: &Arc<Self>,
        entry: &mut CacheEntry,
        key: &ExecutionKey,
        now: Instant,
        seq: u64,
    ) -> (ExecutionContext, EntryPin) {
        entry.refcount += 1;
        entry.last_access = now;
        entry.access_seq = seq;
        let pin = EntryPin {
            shared: Arc::clone(self),
            key: key.clone(),
        };
        (entry.context.clone(), pin)
    }

    fn unpin(&self, key: &ExecutionKey) {
        let mut table = self.table();
        let seq = table.next_seq();
        if let Some(entry) = table.entries.get_mut(key) {
            entry.refcount = entry.refcount.saturating_sub(1);
            entry.last_access = Instant::now();
            entry.access_seq = seq;
        }
        if self.is_over_budget(&table, 0) {
            self.make_room(&mut table, 0, MetricScope::CacheGetOrCreate);
        }
    }
}

/// Keeps a cache entry pinned until dropped.
struct EntryPin {
    shared: Arc<CacheShared>,
    key: ExecutionKey,
}

impl Drop for EntryPin {
    fn drop(&mut self) {
        self.shared.unpin(&self.key);
    }
}

/// Exclusive access to a cached execution.
///
/// Derefs to the [`LockedExecution`]. Release it with
/// [`release`](Self::release); a guard dropped without an explicit release
/// is released as failed, so its in-memory state is discarded.
pub struct ExecutionGuard {
    key: ExecutionKey,
    handle: LockedExecution,
    pin: Option<EntryPin>,
    released: bool,
    force_clear: bool,
}

impl ExecutionGuard {
    fn new(handle: LockedExecution, pin: Option<EntryPin>, force_clear: bool) -> Self {
        Self {
            key: handle.key().clone(),
            handle,
            pin,
            released: false,
            force_clear,
        }
    }

    pub fn key(&self) -> &ExecutionKey {
        &self.key
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Unlock the execution and unpin its cache entry.
    ///
    /// The state is cleared first when `failed` is set, when the guard was
    /// acquired for the current run, or while unwinding. Only the first call
    /// has any effect.
    pub fn release(&mut self, failed: bool) {
        if self.released {
            return;
        }
        self.released = true;

        if failed || self.force_clear || std::thread::panicking() {
            self.handle.clear();
        }
        self.handle.unlock();
        self.pin = None;
        debug!(key = %self.key, failed, "Released execution");
    }
}

impl fmt::Debug for ExecutionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGuard")
            .field("key", &self.key)
            .field("released", &self.released)
            .field("force_clear", &self.force_clear)
            .finish()
    }
}

impl Deref for ExecutionGuard {
    type Target = LockedExecution;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl DerefMut for ExecutionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.handle
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.release(true);
    }
}

/// Result of [`ExecutionCache::acquire_dual_fetch`].
pub struct DualFetch {
    /// Locked cached handle, when the run was already cached.
    pub cached: Option<ExecutionGuard>,
    /// Uncached context bound directly to the store.
    pub fresh: ExecutionContext,
    pub cache_hit: bool,
}

/// Bounded cache of execution contexts.
pub struct ExecutionCache {
    shared: Arc<CacheShared>,
    store: Arc<dyn ExecutionStore>,
    domains: Arc<dyn DomainDirectory>,
    metrics: Arc<dyn MetricsSink>,
    backoff: ExponentialBuilder,
}

impl ExecutionCache {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn ExecutionStore>,
        domains: Arc<dyn DomainDirectory>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let table = EntryTable {
            entries: HashMap::with_capacity(config.initial_capacity),
            next_seq: 0,
        };
        Self {
            shared: Arc::new(CacheShared {
                config,
                metrics: Arc::clone(&metrics),
                table: Mutex::new(table),
            }),
            store,
            domains,
            metrics,
            backoff: persistence_backoff(&PersistenceRetryConfig::default()),
        }
    }

    /// Replace the backoff used for persistence calls.
    pub fn with_retry(mut self, retry: &PersistenceRetryConfig) -> Self {
        self.backoff = persistence_backoff(retry);
        self
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.shared.table().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ExecutionKey) -> bool {
        self.shared.table().entries.contains_key(key)
    }

    /// Number of holders and waiters pinning `key`'s entry.
    pub fn pin_count(&self, key: &ExecutionKey) -> Option<usize> {
        self.shared
            .table()
            .entries
            .get(key)
            .map(|entry| entry.refcount)
    }

    /// Lock the execution named by `identity`, waiting until `cancel` fires.
    pub async fn acquire(
        &self,
        identity: &WorkflowIdentity,
        cancel: &CancellationToken,
    ) -> Result<ExecutionGuard, CacheError> {
        let scope = MetricScope::CacheGetOrCreate;
        let _sw = Stopwatch::start(&self.metrics, scope);

        let result: Result<_, CacheError> = async {
            let key = self.resolve(identity, cancel).await?;
            self.lock_key(key, cancel, false, scope).await
        }
        .await;
        self.count_failure(scope, &result);
        result
    }

    /// Lock the current run of a workflow.
    ///
    /// The current run can change between calls, so the state is always
    /// cleared on release.
    pub async fn acquire_current(
        &self,
        domain_id: &str,
        workflow_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionGuard, CacheError> {
        let scope = MetricScope::CacheGetOrCreateCurrent;
        let _sw = Stopwatch::start(&self.metrics, scope);

        let result: Result<_, CacheError> = async {
            let identity = WorkflowIdentity::current(domain_id, workflow_id);
            let key = self.resolve(&identity, cancel).await?;
            self.lock_key(key, cancel, true, scope).await
        }
        .await;
        self.count_failure(scope, &result);
        result
    }

    /// [`acquire`](Self::acquire) with cancellation after `timeout`.
    pub async fn acquire_with_timeout(
        &self,
        identity: &WorkflowIdentity,
        timeout: Duration,
    ) -> Result<ExecutionGuard, CacheError> {
        let cancel = CancellationToken::new();
        let acquire = self.acquire(identity, &cancel);
        tokio::pin!(acquire);

        tokio::select! {
            result = &mut acquire => result,
            _ = tokio::time::sleep(timeout) => {
                cancel.cancel();
                acquire.await
            }
        }
    }

    /// Fetch the cached handle without inserting on a miss, plus a fresh
    /// context that bypasses the cache.
    pub async fn acquire_dual_fetch(
        &self,
        identity: &WorkflowIdentity,
        cancel: &CancellationToken,
    ) -> Result<DualFetch, CacheError> {
        let scope = MetricScope::CacheGetAndCreate;
        let _sw = Stopwatch::start(&self.metrics, scope);

        let result: Result<_, CacheError> = async {
            let key = self.resolve(identity, cancel).await?;
            let fresh = self.new_context(key.clone());

            let pinned = if self.shared.config.disabled {
                None
            } else {
                self.shared.pin_cached(&key, scope)
            };
            let Some((context, pin)) = pinned else {
                self.metrics.incr_counter(scope, MetricCounter::CacheMiss);
                return Ok(DualFetch {
                    cached: None,
                    fresh,
                    cache_hit: false,
                });
            };

            let handle = self.lock_context(&context, cancel, scope).await?;
            Ok(DualFetch {
                cached: Some(ExecutionGuard::new(handle, Some(pin), false)),
                fresh,
                cache_hit: true,
            })
        }
        .await;
        self.count_failure(scope, &result);
        result
    }

    /// Resolve the current run id, retrying transient store failures until
    /// the retries run out or `cancel` fires.
    pub async fn current_run_id(
        &self,
        domain_id: &str,
        workflow_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Uuid, CacheError> {
        let scope = MetricScope::CacheGetCurrentExecution;
        let _sw = Stopwatch::start(&self.metrics, scope);

        let result: Result<_, CacheError> = async {
            let domain_name = self.domains.domain_name(domain_id).await?;
            let lookup = retry_transient(self.backoff.clone(), "get_current_run_id", || {
                self.store
                    .get_current_run_id(domain_id, &domain_name, workflow_id)
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(domain_id, workflow_id, "Current run lookup cancelled");
                    Err(CacheError::LookupCancelled {
                        domain_id: domain_id.to_string(),
                        workflow_id: workflow_id.to_string(),
                    })
                }
                run_id = lookup => Ok(run_id?),
            }
        }
        .await;
        self.count_failure(scope, &result);
        result
    }

    async fn resolve(
        &self,
        identity: &WorkflowIdentity,
        cancel: &CancellationToken,
    ) -> Result<ExecutionKey, CacheError> {
        if identity.domain_id().is_empty() {
            return Err(CacheError::Validation("empty domain id".to_string()));
        }
        if identity.workflow_id().is_empty() {
            return Err(CacheError::Validation("empty workflow id".to_string()));
        }

        let run_id = match identity.run() {
            RunSelector::Specific(raw) => {
                let run_id = Uuid::parse_str(raw)
                    .map_err(|e| CacheError::Validation(format!("run id {raw:?}: {e}")))?;
                self.domains.domain_name(identity.domain_id()).await?;
                run_id
            }
            RunSelector::Current => {
                self.current_run_id(identity.domain_id(), identity.workflow_id(), cancel)
                    .await?
            }
        };

        Ok(ExecutionKey::new(
            identity.domain_id(),
            identity.workflow_id(),
            run_id,
        ))
    }

    async fn lock_key(
        &self,
        key: ExecutionKey,
        cancel: &CancellationToken,
        force_clear: bool,
        scope: MetricScope,
    ) -> Result<ExecutionGuard, CacheError> {
        if self.shared.config.disabled {
            let context = self.new_context(key);
            let handle = self.lock_context(&context, cancel, scope).await?;
            return Ok(ExecutionGuard::new(handle, None, force_clear));
        }

        let (context, pin) = self.shared.pin(&key, &self.store, &self.backoff, scope)?;
        let handle = self.lock_context(&context, cancel, scope).await?;
        Ok(ExecutionGuard::new(handle, Some(pin), force_clear))
    }

    fn new_context(&self, key: ExecutionKey) -> ExecutionContext {
        ExecutionContext::new(key, Arc::clone(&self.store), self.backoff.clone())
    }

    async fn lock_context(
        &self,
        context: &ExecutionContext,
        cancel: &CancellationToken,
        scope: MetricScope,
    ) -> Result<LockedExecution, CacheError> {
        context.lock(cancel).await.map_err(|_| {
            self.metrics
                .incr_counter(scope, MetricCounter::AcquireLockFailed);
            CacheError::Cancelled(context.key().clone())
        })
    }

    fn count_failure<T>(&self, scope: MetricScope, result: &Result<T, CacheError>) {
        if result.is_err() {
            self.metrics.incr_counter(scope, MetricCounter::Failures);
        }
    }
}
