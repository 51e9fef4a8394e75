//! In-memory store.
//!
//! Stands in for the external durable store in tests and in the demo binary.

use crate::store::{CredentialStore, ResourceStore, StoredCredential};
use ::async_trait::async_trait;
use atrium_core::{
    new_resource_id, Address, AtriumError, AtriumResult, Clock, Cursor, ListFilter, Resource,
    ResourceId, ResourceKind, Role, StorageError, SystemClock, User,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Table<R> = RwLock<HashMap<ResourceId, R>>;

/// Thread-safe in-memory implementation of every store trait.
#[derive(Debug)]
pub struct InMemoryStore {
    users: Table<User>,
    addresses: Table<Address>,
    credentials: RwLock<HashMap<ResourceId, StoredCredential>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> AtriumResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| AtriumError::Storage(StorageError::LockPoisoned))
}

fn write_lock<T>(lock: &RwLock<T>) -> AtriumResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| AtriumError::Storage(StorageError::LockPoisoned))
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: RwLock::default(),
            addresses: RwLock::default(),
            credentials: RwLock::default(),
            clock,
        }
    }

    /// Register login material. Replaces any credential for the same user id.
    ///
    /// The credential's own `username` is used only while no user record
    /// carries its id, as for a bootstrap admin.
    pub fn insert_credential(&self, credential: StoredCredential) -> AtriumResult<()> {
        write_lock(&self.credentials)?.insert(credential.user_id, credential);
        Ok(())
    }

    /// Insert a fully formed record, bypassing id generation.
    pub fn seed<R: Tabled>(&self, record: R) -> AtriumResult<()> {
        write_lock(R::table(self))?.insert(record.id(), record);
        Ok(())
    }

    pub fn user_count(&self) -> AtriumResult<usize> {
        Ok(read_lock(&self.users)?.len())
    }

    pub fn address_count(&self) -> AtriumResult<usize> {
        Ok(read_lock(&self.addresses)?.len())
    }
}

/// Resource kinds the in-memory store has a table for.
pub trait Tabled: Resource {
    fn table(store: &InMemoryStore) -> &Table<Self>;

    /// Value that must be unique across the table, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Cleanup of dependent rows. Runs while the table's write lock is
    /// held, before the row itself goes; an error leaves the row in place.
    fn on_delete(_store: &InMemoryStore, _id: ResourceId) -> AtriumResult<()> {
        Ok(())
    }
}

impl Tabled for User {
    fn table(store: &InMemoryStore) -> &Table<Self> {
        &store.users
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.username.to_lowercase())
    }

    fn on_delete(store: &InMemoryStore, id: ResourceId) -> AtriumResult<()> {
        write_lock(&store.credentials)?.remove(&id);
        Ok(())
    }
}

impl Tabled for Address {
    fn table(store: &InMemoryStore) -> &Table<Self> {
        &store.addresses
    }
}

fn ensure_unique<R: Tabled>(rows: &HashMap<ResourceId, R>, candidate: &R) -> AtriumResult<()> {
    let Some(key) = candidate.unique_key() else {
        return Ok(());
    };
    let clash = rows
        .values()
        .any(|row| row.id() != candidate.id() && row.unique_key().as_deref() == Some(key.as_str()));
    if clash {
        return Err(StorageError::Conflict {
            kind: R::KIND,
            reason: format!("{} already taken", key),
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl<R: Tabled> ResourceStore<R> for InMemoryStore {
    async fn create(&self, draft: R::Draft) -> AtriumResult<R> {
        let record = R::from_draft(draft, new_resource_id(), self.clock.now())?;
        let mut rows = write_lock(R::table(self))?;
        ensure_unique(&rows, &record)?;
        rows.insert(record.id(), record.clone());
        Ok(record)
    }

    async fn read(&self, id: ResourceId) -> AtriumResult<Option<R>> {
        Ok(read_lock(R::table(self))?.get(&id).cloned())
    }

    async fn update(&self, id: ResourceId, patch: R::Patch) -> AtriumResult<Option<R>> {
        let mut rows = write_lock(R::table(self))?;
        let Some(current) = rows.get(&id) else {
            return Ok(None);
        };
        let mut next = current.clone();
        if !next.apply_patch(patch, self.clock.now())? {
            return Ok(Some(next));
        }
        ensure_unique(&rows, &next)?;
        rows.insert(id, next.clone());
        Ok(Some(next))
    }

    async fn delete(&self, id: ResourceId) -> AtriumResult<bool> {
        let mut rows = write_lock(R::table(self))?;
        if !rows.contains_key(&id) {
            return Ok(false);
        }
        R::on_delete(self, id)?;
        rows.remove(&id);
        Ok(true)
    }

    async fn list(&self, filter: &ListFilter, cursor: &Cursor) -> AtriumResult<Vec<R>> {
        let rows = read_lock(R::table(self))?;
        let mut matched: Vec<&R> = rows.values().filter(|r| r.matches(filter)).collect();
        matched.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        let window = cursor.window(matched.len());
        Ok(matched[window].iter().map(|r| (*r).clone()).collect())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_credentials(&self, username: &str) -> AtriumResult<Option<StoredCredential>> {
        // Lock order is users, then credentials, same as delete.
        let users = read_lock(&self.users)?;
        let credentials = read_lock(&self.credentials)?;

        let wanted = username.to_lowercase();
        if let Some(user) = users.values().find(|u| u.username.to_lowercase() == wanted) {
            return Ok(credentials.get(&user.id).map(|c| StoredCredential {
                username: user.username.clone(),
                ..c.clone()
            }));
        }
        Ok(credentials
            .values()
            .find(|c| c.username == username && !users.contains_key(&c.user_id))
            .cloned())
    }

    async fn set_password(
        &self,
        user_id: ResourceId,
        password_hash: String,
        role: Role,
    ) -> AtriumResult<()> {
        let users = read_lock(&self.users)?;
        let Some(user) = users.get(&user_id) else {
            return Err(StorageError::NotFound {
                kind: ResourceKind::User,
                id: user_id,
            }
            .into());
        };
        write_lock(&self.credentials)?.insert(
            user_id,
            StoredCredential {
                user_id,
                username: user.username.clone(),
                password_hash,
                role,
            },
        );
        Ok(())
    }
}
