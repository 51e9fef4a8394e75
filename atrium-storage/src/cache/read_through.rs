//! Read-through cache with write-side fencing.
//!
//! [`CacheManager`] owns every cached value. Reads go through
//! [`CacheManager::get_or_populate`], which coalesces concurrent misses per
//! key and refuses to store a value whose store read was overtaken by an
//! invalidation (see [`super::watermark`]).

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atrium_core::{AtriumResult, CacheError, Clock, ResourceId, ResourceKind, SystemClock};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use super::memory_backend::MemoryCacheBackend;
use super::read::CacheRead;
use super::traits::{CacheBackend, CacheEntry, CacheStats, Lookup};
use super::watermark::{InvalidationJournal, Watermark};
use super::{CacheKey, Invalidation};

/// Configuration for the read-through cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for kinds without an override.
    pub default_ttl: Duration,
    /// Per-kind TTL overrides.
    pub kind_ttls: BTreeMap<ResourceKind, Duration>,
    /// LRU bound on single-record entries.
    pub object_capacity: usize,
    /// LRU bound on list-page entries.
    pub list_capacity: usize,
    /// Scopes the invalidation journal remembers before folding.
    pub journal_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
            kind_ttls: BTreeMap::new(),
            object_capacity: 3_000,
            list_capacity: 400,
            journal_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TTL used by every kind without an override.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_kind_ttl(mut self, kind: ResourceKind, ttl: Duration) -> Self {
        self.kind_ttls.insert(kind, ttl);
        self
    }

    pub fn with_object_capacity(mut self, capacity: usize) -> Self {
        self.object_capacity = capacity;
        self
    }

    pub fn with_list_capacity(mut self, capacity: usize) -> Self {
        self.list_capacity = capacity;
        self
    }

    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        self.kind_ttls.get(&kind).copied().unwrap_or(self.default_ttl)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
    invalidated: AtomicU64,
    stale_puts_rejected: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

/// The single owner of cached state.
#[derive(Debug)]
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    journal: InvalidationJournal,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    inflight: DashMap<CacheKey, Arc<AsyncMutex<()>>>,
    counters: Counters,
    /// Set when an invalidation could not be carried out. From then on every
    /// read reports the cache as inconsistent so callers go to the store.
    tripped: AtomicBool,
}

impl CacheManager {
    /// In-memory LRU cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let backend = Arc::new(MemoryCacheBackend::new(
            config.object_capacity,
            config.list_capacity,
        ));
        Self::with_backend(backend, config, clock)
    }

    pub fn with_backend(
        backend: Arc<dyn CacheBackend>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            journal: InvalidationJournal::new(config.journal_capacity),
            config,
            clock,
            inflight: DashMap::new(),
            counters: Counters::default(),
            tripped: AtomicBool::new(false),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        self.config.ttl_for(kind)
    }

    /// Whether a failed invalidation has switched the cache off.
    pub fn is_disabled(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    fn ensure_usable(&self) -> AtriumResult<()> {
        if self.is_disabled() {
            return Err(CacheError::Inconsistent {
                reason: "cache disabled after a failed invalidation".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn probe(&self, key: &CacheKey) -> AtriumResult<Option<CacheEntry>> {
        self.ensure_usable()?;
        match self.backend.lookup(key, self.clock.now())? {
            Lookup::Hit(entry) => Ok(Some(entry)),
            Lookup::Expired => {
                bump(&self.counters.expired, 1);
                Ok(None)
            }
            Lookup::Miss => Ok(None),
        }
    }

    /// Live entry for `key`, or `None`. Expired entries are evicted here.
    pub fn get(&self, key: &CacheKey) -> AtriumResult<Option<CacheEntry>> {
        let entry = self.probe(key)?;
        match &entry {
            Some(_) => bump(&self.counters.hits, 1),
            None => bump(&self.counters.misses, 1),
        }
        Ok(entry)
    }

    /// Store `value` under `key`, overwriting whatever was there.
    pub fn put(&self, key: CacheKey, value: Value, ttl: Duration) -> AtriumResult<CacheEntry> {
        self.ensure_usable()?;
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        let _fence = self.journal.fence_read()?;
        self.insert(entry.clone())?;
        Ok(entry)
    }

    /// Store `entry` unless an invalidation covering its key was recorded
    /// after `observed`. Returns whether it was stored.
    pub fn put_if_fresh(&self, entry: CacheEntry, observed: Watermark) -> AtriumResult<bool> {
        self.ensure_usable()?;
        let fence = self.journal.fence_read()?;
        if !fence.admits(&entry.key, observed) {
            bump(&self.counters.stale_puts_rejected, 1);
            tracing::debug!(key = %entry.key, watermark = observed.sequence, "stale population rejected");
            return Ok(false);
        }
        self.insert(entry)?;
        Ok(true)
    }

    fn insert(&self, entry: CacheEntry) -> AtriumResult<()> {
        if let Some(evicted) = self.backend.insert(entry)? {
            bump(&self.counters.evictions, 1);
            tracing::trace!(key = %evicted, "evicted");
        }
        Ok(())
    }

    /// Remove every entry matching `predicate`.
    ///
    /// Once this returns, no `get` observes a matching entry that was stored
    /// before the call, and no population that started before the call can
    /// store one.
    pub fn invalidate(&self, predicate: Invalidation) -> AtriumResult<u64> {
        self.invalidate_all(&[predicate])
    }

    /// Drop every projection of one record plus every list page of its kind.
    pub fn invalidate_resource(&self, kind: ResourceKind, id: ResourceId) -> AtriumResult<u64> {
        self.invalidate_all(&[
            Invalidation::Resource { kind, id },
            Invalidation::ListNamespace { kind },
        ])
    }

    /// Apply several predicates as one step.
    pub fn invalidate_all(&self, predicates: &[Invalidation]) -> AtriumResult<u64> {
        let mut fence = self.journal.fence_write()?;
        let mut removed = 0;
        for predicate in predicates {
            fence.record(*predicate);
            match self.backend.remove_matching(predicate) {
                Ok(n) => removed += n,
                Err(e) => {
                    self.tripped.store(true, Ordering::Release);
                    tracing::error!(error = %e, scope = %predicate, "invalidation failed, cache disabled");
                    return Err(CacheError::Inconsistent {
                        reason: format!("invalidation of {} failed: {}", predicate, e),
                    }
                    .into());
                }
            }
        }
        drop(fence);
        bump(&self.counters.invalidated, removed);
        tracing::debug!(?predicates, removed, "invalidated");
        Ok(removed)
    }

    /// Drop every entry and switch a disabled cache back on.
    ///
    /// Populations that started before the reset cannot store afterwards.
    /// If the backend cannot be cleared the cache stays disabled.
    pub fn reset(&self) -> AtriumResult<u64> {
        let mut fence = self.journal.fence_write()?;
        fence.record(Invalidation::Everything);
        let removed = self.backend.remove_matching(&Invalidation::Everything)?;
        let was_disabled = self.tripped.swap(false, Ordering::AcqRel);
        drop(fence);
        bump(&self.counters.invalidated, removed);
        tracing::warn!(removed, was_disabled, "cache reset");
        Ok(removed)
    }

    /// Serve `key` from the cache, or run `fetch` once and cache its result.
    ///
    /// Concurrent callers missing on the same key wait for a single fetch.
    /// `Ok(None)` from `fetch` means "absent" and is not cached. Errors from
    /// `fetch` are returned untouched and nothing is cached.
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> AtriumResult<Option<CacheRead>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AtriumResult<Option<Value>>>,
    {
        if let Some(entry) = self.get(key)? {
            return Ok(Some(CacheRead::from_cache(entry)));
        }

        let gate = InflightGate::join(&self.inflight, key);
        let _turn = gate.lock().await;
        self.populate(key, fetch).await
    }

    async fn populate<F, Fut>(&self, key: &CacheKey, fetch: F) -> AtriumResult<Option<CacheRead>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AtriumResult<Option<Value>>>,
    {
        // Someone ahead of us in the gate may have filled the slot.
        if let Some(entry) = self.probe(key)? {
            return Ok(Some(CacheRead::from_cache(entry)));
        }

        let observed = self.journal.current_watermark()?;
        let Some(value) = fetch().await? else {
            return Ok(None);
        };

        let entry = CacheEntry::new(key.clone(), value, self.clock.now(), self.ttl_for(key.kind()));
        if let Err(e) = self.put_if_fresh(entry.clone(), observed) {
            tracing::warn!(key = %key, error = %e, "could not cache populated value");
        }
        Ok(Some(CacheRead::populated(entry)))
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            expired: load(&self.counters.expired),
            evictions: load(&self.counters.evictions),
            invalidated: load(&self.counters.invalidated),
            stale_puts_rejected: load(&self.counters.stale_puts_rejected),
            entry_count: self.backend.len().map(|n| n as u64).unwrap_or(0),
            disabled: self.is_disabled(),
        }
    }
}

/// A caller's share of the per-key population gate.
///
/// Leaving, by completion or by the future being dropped mid-await, removes
/// the map entry once no other caller holds the gate.
struct InflightGate<'a> {
    map: &'a DashMap<CacheKey, Arc<AsyncMutex<()>>>,
    key: &'a CacheKey,
    gate: Arc<AsyncMutex<()>>,
}

impl<'a> InflightGate<'a> {
    fn join(map: &'a DashMap<CacheKey, Arc<AsyncMutex<()>>>, key: &'a CacheKey) -> Self {
        let gate = map.entry(key.clone()).or_default().clone();
        Self { map, key, gate }
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl Drop for InflightGate<'_> {
    fn drop(&mut self) {
        // Two handles left means the map's and ours.
        self.map
            .remove_if(self.key, |_, gate| Arc::strong_count(gate) == 2);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::{ListQuery, ManualClock, StorageError, ViewKind};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at_epoch_secs(1_704_067_200))
    }

    fn manager(clock: Arc<ManualClock>) -> CacheManager {
        CacheManager::with_clock(CacheConfig::default(), clock)
    }

    fn address_key(n: u128, view: ViewKind) -> CacheKey {
        CacheKey::object(ResourceKind::Address, Uuid::from_u128(n), view)
    }

    #[test]
    fn test_put_then_get_round_trips() {
        let cache = manager(clock());
        let key = address_key(42, ViewKind::Admin);
        let value = json!({"id": 42, "city": "X"});
        let stored = cache.put(key.clone(), value.clone(), Duration::from_secs(60)).unwrap();

        let hit = cache.get(&key).unwrap().unwrap();
        assert_eq!(*hit.value, value);
        assert_eq!(hit.etag, stored.etag);
        assert_eq!(hit.etag, crate::cache::tag_of(&value));
    }

    #[test]
    fn test_ttl_expiry_is_a_miss() {
        let clock = clock();
        let cache = manager(clock.clone());
        let key = address_key(1, ViewKind::Admin);
        cache.put(key.clone(), json!(1), Duration::from_secs(60)).unwrap();

        clock.advance(Duration::from_secs(59));
        assert!(cache.get(&key).unwrap().is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&key).unwrap().is_none());
        assert_eq!(cache.stats().expired, 1);
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn test_invalidate_resource_spans_views_and_lists() {
        let cache = manager(clock());
        let ttl = Duration::from_secs(60);
        for view in ViewKind::ALL {
            cache.put(address_key(42, view), json!({"v": view}), ttl).unwrap();
        }
        let list = CacheKey::list(&ListQuery::all(ResourceKind::Address), ViewKind::Admin);
        cache.put(list.clone(), json!([]), ttl).unwrap();
        cache.put(address_key(7, ViewKind::Admin), json!({}), ttl).unwrap();

        let removed = cache
            .invalidate_resource(ResourceKind::Address, Uuid::from_u128(42))
            .unwrap();
        assert_eq!(removed, 4);
        for view in ViewKind::ALL {
            assert!(cache.get(&address_key(42, view)).unwrap().is_none());
        }
        assert!(cache.get(&list).unwrap().is_none());
        assert!(cache.get(&address_key(7, ViewKind::Admin)).unwrap().is_some());
    }

    #[test]
    fn test_invalidation_is_idempotent() {
        let cache = manager(clock());
        let key = address_key(3, ViewKind::Admin);
        cache.put(key.clone(), json!(3), Duration::from_secs(60)).unwrap();
        let scope = Invalidation::Resource {
            kind: ResourceKind::Address,
            id: Uuid::from_u128(3),
        };
        assert_eq!(cache.invalidate(scope).unwrap(), 1);
        assert_eq!(cache.invalidate(scope).unwrap(), 0);
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_populate_caches_once() {
        let cache = manager(clock());
        let key = address_key(42, ViewKind::Admin);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let read = cache
                .get_or_populate(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(json!({"id": 42, "city": "X"})))
                })
                .await
                .unwrap()
                .unwrap();
            assert_eq!(read.value()["city"], "X");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 2);
    }

    #[tokio::test]
    async fn test_absent_values_are_not_cached() {
        let cache = manager(clock());
        let key = address_key(404, ViewKind::Admin);
        let read = cache
            .get_or_populate(&key, || async { Ok(None) })
            .await
            .unwrap();
        assert!(read.is_none());
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_does_not_populate() {
        let cache = manager(clock());
        let key = address_key(5, ViewKind::Admin);
        let err = cache
            .get_or_populate(&key, || async {
                Err(StorageError::Unavailable {
                    reason: "down".to_string(),
                }
                .into())
            })
            .await
            .unwrap_err();
        assert!(!err.is_cache_error());
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_rejects_stale_value() {
        let cache = manager(clock());
        let key = address_key(42, ViewKind::Admin);

        let read = cache
            .get_or_populate(&key, || async {
                // A write lands while the old value is in flight.
                cache
                    .invalidate_resource(ResourceKind::Address, Uuid::from_u128(42))
                    .unwrap();
                Ok(Some(json!({"id": 42, "city": "old"})))
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(read.value()["city"], "old");
        assert!(cache.get(&key).unwrap().is_none());
        assert_eq!(cache.stats().stale_puts_rejected, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_coalesce() {
        let cache = Arc::new(manager(clock()));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = address_key(9, ViewKind::Admin);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_populate(&key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Some(json!({"id": 9})))
                    })
                    .await
            }));
        }
        for handle in handles {
            let read = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(read.value()["id"], 9);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.inflight.is_empty());
    }

    #[derive(Debug, Default)]
    struct BrokenBackend {
        healed: AtomicBool,
    }

    impl CacheBackend for BrokenBackend {
        fn lookup(&self, _key: &CacheKey, _now: atrium_core::Timestamp) -> AtriumResult<Lookup> {
            Ok(Lookup::Miss)
        }
        fn insert(&self, _entry: CacheEntry) -> AtriumResult<Option<CacheKey>> {
            Ok(None)
        }
        fn remove_matching(&self, _predicate: &Invalidation) -> AtriumResult<u64> {
            if self.healed.load(Ordering::SeqCst) {
                Ok(0)
            } else {
                Err(CacheError::LockPoisoned { component: "test" }.into())
            }
        }
        fn len(&self) -> AtriumResult<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_failed_invalidation_disables_cache() {
        let cache = CacheManager::with_backend(
            Arc::new(BrokenBackend::default()),
            CacheConfig::default(),
            clock(),
        );
        let key = address_key(1, ViewKind::Admin);
        assert!(cache.get(&key).unwrap().is_none());
        assert!(!cache.stats().disabled);

        let err = cache.invalidate(Invalidation::Everything).unwrap_err();
        assert!(err.is_cache_error());
        assert!(cache.get(&key).unwrap_err().is_cache_error());
        assert!(cache.put(key, json!(1), Duration::from_secs(1)).is_err());
        assert!(cache.stats().disabled);
    }

    #[test]
    fn test_reset_reenables_only_after_backend_clears() {
        let backend = Arc::new(BrokenBackend::default());
        let cache = CacheManager::with_backend(backend.clone(), CacheConfig::default(), clock());
        let key = address_key(1, ViewKind::Admin);
        cache.invalidate(Invalidation::Everything).unwrap_err();

        // Still broken: the reset fails and the cache stays off.
        assert!(cache.reset().is_err());
        assert!(cache.is_disabled());

        backend.healed.store(true, Ordering::SeqCst);
        cache.reset().unwrap();
        assert!(!cache.stats().disabled);
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_reset_clears_entries() {
        let cache = manager(clock());
        let key = address_key(2, ViewKind::Admin);
        cache.put(key.clone(), json!(2), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.reset().unwrap(), 1);
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_population_releases_its_gate() {
        let cache = Arc::new(manager(clock()));
        let mut handles = Vec::new();
        for n in 0..10u128 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = address_key(n % 4, ViewKind::Admin);
                cache
                    .get_or_populate(&key, || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(Some(json!({})))
                    })
                    .await
            }));
        }
        // Let every task reach the gate before cancelling.
        while cache.inflight.len() < 4 {
            tokio::task::yield_now().await;
        }
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            assert!(handle.await.unwrap_err().is_cancelled());
        }
        assert!(cache.inflight.is_empty());
    }

    #[test]
    fn test_kind_ttl_override() {
        let config = CacheConfig::new()
            .with_ttl(Duration::from_secs(60))
            .with_kind_ttl(ResourceKind::User, Duration::from_secs(5));
        assert_eq!(config.ttl_for(ResourceKind::User), Duration::from_secs(5));
        assert_eq!(config.ttl_for(ResourceKind::Address), Duration::from_secs(60));
    }
}
