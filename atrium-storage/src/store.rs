//! External store adapter traits.
//!
//! The persistent store is authoritative. Everything the access layer caches
//! is a transient copy of what these traits return.

use ::async_trait::async_trait;
use atrium_core::{AtriumResult, Cursor, ListFilter, Resource, ResourceId, Role};
use std::fmt;

/// CRUD access to one resource kind.
#[async_trait]
pub trait ResourceStore<R: Resource>: Send + Sync {
    /// Insert a new record built from `draft`.
    async fn create(&self, draft: R::Draft) -> AtriumResult<R>;

    /// Get a record by ID.
    async fn read(&self, id: ResourceId) -> AtriumResult<Option<R>>;

    /// Apply a partial update. Returns `None` when the record does not exist.
    async fn update(&self, id: ResourceId, patch: R::Patch) -> AtriumResult<Option<R>>;

    /// Delete a record. Returns whether anything was removed.
    async fn delete(&self, id: ResourceId) -> AtriumResult<bool>;

    /// Records matching `filter`, newest first, windowed by `cursor`.
    async fn list(&self, filter: &ListFilter, cursor: &Cursor) -> AtriumResult<Vec<R>>;
}

/// Login material for one user.
///
/// Stores key this by `user_id`. `username` is the login name at lookup
/// time, which for accounts with a user record is that record's username.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub user_id: ResourceId,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

/// Login material, held per user id and looked up by username.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credentials(&self, username: &str) -> AtriumResult<Option<StoredCredential>>;

    /// Store or replace the password hash of an existing user.
    async fn set_password(
        &self,
        user_id: ResourceId,
        password_hash: String,
        role: Role,
    ) -> AtriumResult<()>;
}
