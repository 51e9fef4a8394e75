//! Atrium Storage - Store Adapters and Cache
//!
//! Defines the external store abstraction, an in-memory store, and the
//! read-through cache that mirrors store results for the access layer.

pub mod cache;
pub mod memory;
pub mod store;

pub use memory::{InMemoryStore, Tabled};
pub use store::{CredentialStore, ResourceStore, StoredCredential};

// Re-export cache types for API integration
pub use cache::{
    tag_of, validate, CacheBackend, CacheConfig, CacheEntry, CacheKey, CacheManager, CacheRead,
    CacheStats, ETag, Invalidation, InvalidationJournal, Lookup, MemoryCacheBackend, ReadSource,
    TagValidation, Watermark,
};
