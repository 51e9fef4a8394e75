//! Atrium Core - Resource Types
//!
//! Records, viewer roles, projections and list queries shared by the storage
//! and API crates. Nothing in here performs I/O.

use chrono::{DateTime, Utc};
use uuid::Uuid;

mod clock;
mod entities;
mod enums;
mod error;
mod filter;
mod resource;

pub use clock::{test_clocks, Clock, FixedClock, ManualClock, SystemClock};
pub use entities::{
    Address, AddressPatch, EmbeddedAddress, NewAddress, NewUser, User, UserPatch,
};
pub use enums::{ResourceKind, Role, ViewKind};
pub use error::{
    AtriumError, AtriumResult, CacheError, ConfigError, StorageError, ValidationError,
};
pub use filter::{Cursor, ListFilter, ListQuery};
pub use resource::{Principal, Resource};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Resource identifier using UUIDv7 for timestamp-sortable IDs.
pub type ResourceId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 ResourceId.
pub fn new_resource_id() -> ResourceId {
    Uuid::now_v7()
}
