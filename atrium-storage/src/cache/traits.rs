//! Cache backend trait, entries and statistics.

use super::{CacheKey, ETag, Invalidation};
use atrium_core::{AtriumResult, Timestamp};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// A cached, already-projected value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Arc<Value>,
    pub etag: ETag,
    pub inserted_at: Timestamp,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Build an entry, tagging `value`.
    pub fn new(key: CacheKey, value: Value, inserted_at: Timestamp, ttl: Duration) -> Self {
        let etag = ETag::of(&value);
        Self {
            key,
            value: Arc::new(value),
            etag,
            inserted_at,
            ttl,
        }
    }

    /// How long the entry has been cached. Zero if `now` precedes insertion.
    pub fn age(&self, now: Timestamp) -> Duration {
        (now - self.inserted_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Live while `now - inserted_at < ttl`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.age(now) >= self.ttl
    }
}

/// Result of a backend lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(CacheEntry),
    /// An entry existed but had outlived its TTL and has been removed.
    Expired,
    Miss,
}

/// Storage for cache entries.
///
/// Every method is synchronous and must not block on I/O. Implementations
/// own their own synchronization.
pub trait CacheBackend: Send + Sync + Debug {
    /// Fetch a live entry, evicting it in the same step if expired.
    fn lookup(&self, key: &CacheKey, now: Timestamp) -> AtriumResult<Lookup>;

    /// Insert or overwrite. Returns the key evicted to make room, if any.
    fn insert(&self, entry: CacheEntry) -> AtriumResult<Option<CacheKey>>;

    /// Remove every entry the predicate matches, returning how many went.
    fn remove_matching(&self, predicate: &Invalidation) -> AtriumResult<u64>;

    fn len(&self) -> AtriumResult<usize>;

    fn is_empty(&self) -> AtriumResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Entries dropped on lookup because their TTL ran out.
    pub expired: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Entries removed by explicit invalidation.
    pub invalidated: u64,
    /// Populations refused because an invalidation overtook them.
    pub stale_puts_rejected: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Whether a failed invalidation has switched the cache off.
    pub disabled: bool,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
