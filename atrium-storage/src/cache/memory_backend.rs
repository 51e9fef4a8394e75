//! Bounded in-process cache backend.
//!
//! Objects and list pages live in two separate LRU maps so that a burst of
//! distinct list queries cannot push single-record entries out.

use super::{CacheBackend, CacheEntry, CacheKey, Invalidation, Lookup};
use atrium_core::{AtriumResult, CacheError, Timestamp};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct MemoryCacheBackend {
    objects: Mutex<LruCache<CacheKey, CacheEntry>>,
    lists: Mutex<LruCache<CacheKey, CacheEntry>>,
}

type Shard = LruCache<CacheKey, CacheEntry>;

impl MemoryCacheBackend {
    /// Capacities of zero are raised to one.
    pub fn new(object_capacity: usize, list_capacity: usize) -> Self {
        Self {
            objects: Mutex::new(LruCache::new(capacity(object_capacity))),
            lists: Mutex::new(LruCache::new(capacity(list_capacity))),
        }
    }

    fn shard_for(&self, key: &CacheKey) -> AtriumResult<MutexGuard<'_, Shard>> {
        if key.is_list() {
            lock(&self.lists, "lists")
        } else {
            lock(&self.objects, "objects")
        }
    }
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

fn lock<'a>(
    shard: &'a Mutex<Shard>,
    component: &'static str,
) -> AtriumResult<MutexGuard<'a, Shard>> {
    shard
        .lock()
        .map_err(|_| CacheError::LockPoisoned { component }.into())
}

fn remove_from(shard: &mut Shard, predicate: &Invalidation) -> u64 {
    let doomed: Vec<CacheKey> = shard
        .iter()
        .filter(|(key, _)| predicate.matches(key))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &doomed {
        shard.pop(key);
    }
    doomed.len() as u64
}

impl CacheBackend for MemoryCacheBackend {
    fn lookup(&self, key: &CacheKey, now: Timestamp) -> AtriumResult<Lookup> {
        let mut shard = self.shard_for(key)?;
        match shard.get(key) {
            None => return Ok(Lookup::Miss),
            Some(entry) if entry.key != *key => {
                return Err(CacheError::Inconsistent {
                    reason: format!("slot {} holds entry for {}", key, entry.key),
                }
                .into());
            }
            Some(entry) if !entry.is_expired(now) => return Ok(Lookup::Hit(entry.clone())),
            Some(_) => {}
        }
        shard.pop(key);
        Ok(Lookup::Expired)
    }

    fn insert(&self, entry: CacheEntry) -> AtriumResult<Option<CacheKey>> {
        let mut shard = self.shard_for(&entry.key)?;
        let key = entry.key.clone();
        let displaced = shard.push(key.clone(), entry);
        Ok(displaced.and_then(|(old_key, _)| (old_key != key).then_some(old_key)))
    }

    fn remove_matching(&self, predicate: &Invalidation) -> AtriumResult<u64> {
        let mut removed = 0;
        if predicate.touches_objects() {
            removed += remove_from(&mut *lock(&self.objects, "objects")?, predicate);
        }
        if predicate.touches_lists() {
            removed += remove_from(&mut *lock(&self.lists, "lists")?, predicate);
        }
        Ok(removed)
    }

    fn len(&self) -> AtriumResult<usize> {
        Ok(lock(&self.objects, "objects")?.len() + lock(&self.lists, "lists")?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::{ListQuery, ResourceKind, ViewKind};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    fn t0() -> Timestamp {
        Utc.timestamp_opt(1_000, 0).unwrap()
    }

    fn object(n: u128) -> CacheKey {
        CacheKey::object(ResourceKind::Address, Uuid::from_u128(n), ViewKind::Admin)
    }

    fn entry(key: CacheKey) -> CacheEntry {
        CacheEntry::new(key, json!({"n": 1}), t0(), Duration::from_secs(10))
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let backend = MemoryCacheBackend::new(2, 2);
        backend.insert(entry(object(1))).unwrap();
        backend.insert(entry(object(2))).unwrap();
        // Touch 1 so 2 becomes the eviction candidate.
        assert!(matches!(backend.lookup(&object(1), t0()).unwrap(), Lookup::Hit(_)));

        let evicted = backend.insert(entry(object(3))).unwrap();
        assert_eq!(evicted, Some(object(2)));
        assert_eq!(backend.lookup(&object(2), t0()).unwrap(), Lookup::Miss);
    }

    #[test]
    fn test_overwrite_is_not_eviction() {
        let backend = MemoryCacheBackend::new(1, 1);
        backend.insert(entry(object(1))).unwrap();
        assert_eq!(backend.insert(entry(object(1))).unwrap(), None);
        assert_eq!(backend.len().unwrap(), 1);
    }

    #[test]
    fn test_expired_entries_are_evicted_on_lookup() {
        let backend = MemoryCacheBackend::new(4, 4);
        backend.insert(entry(object(1))).unwrap();
        let later = t0() + chrono::Duration::seconds(10);
        assert_eq!(backend.lookup(&object(1), later).unwrap(), Lookup::Expired);
        assert_eq!(backend.lookup(&object(1), t0()).unwrap(), Lookup::Miss);
        assert!(backend.is_empty().unwrap());
    }

    #[test]
    fn test_lists_do_not_crowd_out_objects() {
        let backend = MemoryCacheBackend::new(1, 1);
        backend.insert(entry(object(1))).unwrap();
        for offset in 0..3 {
            let query = ListQuery::from_params(
                ResourceKind::Address,
                [("offset", offset.to_string())],
            )
            .unwrap();
            backend.insert(entry(CacheKey::list(&query, ViewKind::Admin))).unwrap();
        }
        assert!(matches!(backend.lookup(&object(1), t0()).unwrap(), Lookup::Hit(_)));
        assert_eq!(backend.len().unwrap(), 2);
    }

    #[test]
    fn test_remove_matching() {
        let backend = MemoryCacheBackend::new(8, 8);
        for view in ViewKind::ALL {
            backend
                .insert(entry(CacheKey::object(ResourceKind::Address, Uuid::from_u128(42), view)))
                .unwrap();
        }
        backend.insert(entry(object(7))).unwrap();
        backend
            .insert(entry(CacheKey::list(&ListQuery::all(ResourceKind::Address), ViewKind::Admin)))
            .unwrap();

        let removed = backend
            .remove_matching(&Invalidation::Resource {
                kind: ResourceKind::Address,
                id: Uuid::from_u128(42),
            })
            .unwrap();
        assert_eq!(removed, 3);
        let removed = backend
            .remove_matching(&Invalidation::ListNamespace {
                kind: ResourceKind::Address,
            })
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.len().unwrap(), 1);
    }
}
