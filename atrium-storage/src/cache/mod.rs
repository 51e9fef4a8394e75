//! Cache layer for projected records and list pages.
//!
//! Values are cached after projection, keyed by the viewer's [`ViewKind`],
//! and tagged with a content digest ([`ETag`]) so conditional reads can be
//! answered from the cache.
//!
//! # Consistency
//!
//! Correctness rests on two mechanisms only: TTL expiry and explicit
//! invalidation. LRU eviction is a space policy. Invalidation is fenced by
//! the [`InvalidationJournal`]: once [`CacheManager::invalidate`] returns,
//! neither an existing entry nor an in-flight population that started before
//! the call can surface the pre-write value.
//!
//! # Example
//!
//! ```ignore
//! let key = CacheKey::object(ResourceKind::Address, id, ViewKind::Admin);
//! let read = cache
//!     .get_or_populate(&key, || async { fetch_and_project(id).await })
//!     .await?;
//!
//! // After a successful write:
//! cache.invalidate_resource(ResourceKind::Address, id)?;
//! ```
//!
//! [`ViewKind`]: atrium_core::ViewKind

pub mod etag;
pub mod key;
pub mod memory_backend;
pub mod read;
pub mod read_through;
pub mod traits;
pub mod watermark;

pub use etag::{tag_of, validate, ETag, TagValidation};
pub use key::{CacheKey, Invalidation};
pub use memory_backend::MemoryCacheBackend;
pub use read::{CacheRead, ReadSource};
pub use read_through::{CacheConfig, CacheManager};
pub use traits::{CacheBackend, CacheEntry, CacheStats, Lookup};
pub use watermark::{FenceRead, FenceWrite, InvalidationJournal, Watermark};
