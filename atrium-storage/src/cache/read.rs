//! Result of a read that may or may not have been served from the cache.

use super::{CacheEntry, ETag};
use atrium_core::Timestamp;
use serde_json::Value;
use std::sync::Arc;

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from a live cache entry.
    Cache,
    /// Fetched from the store on a miss.
    Store,
    /// Fetched from the store because the cache was skipped after a fault.
    Bypass,
}

/// A projected value plus its tag and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead {
    value: Arc<Value>,
    etag: ETag,
    /// When the value was cached (or fetched from the store).
    cached_at: Timestamp,
    source: ReadSource,
}

impl CacheRead {
    /// Create a new cache read from a cache hit.
    pub fn from_cache(entry: CacheEntry) -> Self {
        Self {
            value: entry.value,
            etag: entry.etag,
            cached_at: entry.inserted_at,
            source: ReadSource::Cache,
        }
    }

    /// Value just fetched from the store and handed to the cache.
    pub fn populated(entry: CacheEntry) -> Self {
        Self {
            value: entry.value,
            etag: entry.etag,
            cached_at: entry.inserted_at,
            source: ReadSource::Store,
        }
    }

    /// Value fetched with the cache out of the picture.
    pub fn bypassed(value: Value, fetched_at: Timestamp) -> Self {
        let etag = ETag::of(&value);
        Self {
            value: Arc::new(value),
            etag,
            cached_at: fetched_at,
            source: ReadSource::Bypass,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> Value {
        Arc::try_unwrap(self.value).unwrap_or_else(|shared| (*shared).clone())
    }

    pub fn etag(&self) -> &ETag {
        &self.etag
    }

    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use atrium_core::{ResourceKind, ViewKind};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn test_tags_agree_between_sources() {
        let t0 = Utc.timestamp_opt(1_000, 0).unwrap();
        let value = json!({"id": 42, "city": "X"});
        let key = CacheKey::object(ResourceKind::Address, Uuid::from_u128(42), ViewKind::Admin);
        let entry = CacheEntry::new(key, value.clone(), t0, Duration::from_secs(60));

        let hit = CacheRead::from_cache(entry.clone());
        let populated = CacheRead::populated(entry);
        let bypassed = CacheRead::bypassed(value.clone(), t0);
        assert_eq!(hit.source(), ReadSource::Cache);
        assert_eq!(populated.source(), ReadSource::Store);
        assert_eq!(bypassed.source(), ReadSource::Bypass);
        assert_eq!(hit.etag(), bypassed.etag());
        assert_eq!(bypassed.cached_at(), t0);
        assert_eq!(bypassed.into_value(), value);
    }
}
