//! Access Coordinator
//!
//! Composes the token service, the view resolver, the cache and the stores
//! into the read and write paths. Handlers call into this and nothing else.
//!
//! Read path: authenticate, resolve the view, build a key scoped by that
//! view, get-or-populate through the cache, then compare the client's
//! conditional header against the entry's tag.
//!
//! Write path: authenticate, authorize, write through to the store, and
//! only on success invalidate every projection of the record plus the
//! kind's list namespace.

use atrium_core::{
    Address, AtriumError, AtriumResult, Clock, ListQuery, Principal, Resource, ResourceId, Role,
    StorageError, User, ViewKind,
};
use atrium_storage::{
    validate, CacheKey, CacheManager, CacheRead, CacheStats, CredentialStore, ETag, InMemoryStore,
    ReadSource, ResourceStore, TagValidation,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{check_credentials, IssuedToken, PasswordVerifier, TokenService, AUDIT_TARGET};
use crate::error::{ApiError, ApiResult};
use crate::view::{self, AccessDenied};

// ============================================================================
// STORES
// ============================================================================

/// The external collaborators the coordinator writes through to.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn ResourceStore<User>>,
    pub addresses: Arc<dyn ResourceStore<Address>>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    /// Every role served by one in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            addresses: store.clone(),
            credentials: store,
        }
    }
}

/// Picks the store that holds `Self`.
pub trait StoreSelect: Resource {
    fn select(stores: &Stores) -> &dyn ResourceStore<Self>;

    /// Login password carried by a create input. Taken out before the input
    /// reaches the record store.
    fn take_password(_draft: &mut Self::Draft) -> Option<String> {
        None
    }
}

impl StoreSelect for User {
    fn select(stores: &Stores) -> &dyn ResourceStore<Self> {
        stores.users.as_ref()
    }

    fn take_password(draft: &mut Self::Draft) -> Option<String> {
        draft.password.take()
    }
}

impl StoreSelect for Address {
    fn select(stores: &Stores) -> &dyn ResourceStore<Self> {
        stores.addresses.as_ref()
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// Send `body` with `etag`.
    Full {
        body: Value,
        etag: ETag,
        source: ReadSource,
    },
    /// The client's copy is current; send no body.
    NotModified { etag: ETag },
}

impl ReadOutcome {
    pub fn etag(&self) -> &ETag {
        match self {
            ReadOutcome::Full { etag, .. } | ReadOutcome::NotModified { etag } => etag,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            ReadOutcome::Full { body, .. } => Some(body),
            ReadOutcome::NotModified { .. } => None,
        }
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, ReadOutcome::NotModified { .. })
    }

    fn from_read(read: CacheRead, if_none_match: Option<&str>) -> Self {
        match validate(if_none_match, read.etag()) {
            TagValidation::Fresh => ReadOutcome::NotModified {
                etag: read.etag().clone(),
            },
            TagValidation::Stale => {
                let etag = read.etag().clone();
                let source = read.source();
                ReadOutcome::Full {
                    body: read.into_value(),
                    etag,
                    source,
                }
            }
        }
    }
}

/// Result of a successful create or update, projected for the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    pub id: ResourceId,
    pub body: Value,
    pub etag: ETag,
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Answers "what may this requester see or do, and where does the answer
/// come from".
#[derive(Clone)]
pub struct AccessCoordinator {
    tokens: TokenService,
    cache: Arc<CacheManager>,
    stores: Stores,
    verifier: Arc<dyn PasswordVerifier>,
    store_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl AccessCoordinator {
    pub fn new(
        tokens: TokenService,
        cache: Arc<CacheManager>,
        stores: Stores,
        verifier: Arc<dyn PasswordVerifier>,
        store_timeout: Duration,
    ) -> Self {
        let clock = tokens.config().clock.clone();
        Self {
            tokens,
            cache,
            stores,
            verifier,
            store_timeout,
            clock,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Clear the cache and switch it back on after a failed invalidation.
    /// Admins only.
    pub async fn reset_cache(&self, token: Option<&str>) -> ApiResult<CacheStats> {
        let principal = self
            .principal(token)
            .await?
            .ok_or(AccessDenied::Unauthenticated)?;
        if !principal.is_admin() {
            return Err(AccessDenied::Forbidden("only admins may reset the cache".to_string()).into());
        }
        tracing::info!(target: AUDIT_TARGET, subject = %principal.subject, "cache reset");
        self.cache.reset()?;
        Ok(self.cache.stats())
    }

    /// Principal behind an optional bearer token. No token is an anonymous
    /// caller; a bad token is an error, never a downgrade to anonymous.
    pub async fn principal(&self, token: Option<&str>) -> ApiResult<Option<Principal>> {
        match token {
            None => Ok(None),
            Some(token) => Ok(Some(self.tokens.authenticate(token).await?)),
        }
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Read one record as the caller's view of it.
    pub async fn read<R: StoreSelect>(
        &self,
        token: Option<&str>,
        id: ResourceId,
        if_none_match: Option<&str>,
    ) -> ApiResult<ReadOutcome> {
        let principal = self.principal(token).await?;
        let view = view::resolve_for::<R>(id, principal.as_ref())?;
        let key = CacheKey::object(R::KIND, id, view);

        let read = self
            .read_through(&key, || self.fetch_object::<R>(id, view))
            .await?
            .ok_or_else(|| ApiError::not_found(R::KIND, id))?;

        tracing::debug!(key = %key, source = ?read.source(), cached_at = %read.cached_at(), "object read");
        Ok(ReadOutcome::from_read(read, if_none_match))
    }

    /// Read one page of records. Every item gets the list view.
    pub async fn list<R: StoreSelect>(
        &self,
        token: Option<&str>,
        query: &ListQuery,
        if_none_match: Option<&str>,
    ) -> ApiResult<ReadOutcome> {
        if query.kind != R::KIND {
            return Err(ApiError::invalid_input(format!(
                "query for {} sent to the {} collection",
                query.kind,
                R::KIND
            )));
        }
        let principal = self.principal(token).await?;
        let view = view::resolve_list(R::KIND, principal.as_ref())?;
        let key = CacheKey::list(query, view);

        let read = self
            .read_through(&key, || self.fetch_page::<R>(query, view))
            .await?
            .ok_or_else(|| ApiError::internal_error("list fetch returned nothing"))?;

        tracing::debug!(key = %key, source = ?read.source(), cached_at = %read.cached_at(), "list read");
        Ok(ReadOutcome::from_read(read, if_none_match))
    }

    /// Get-or-populate through the cache, falling back to the store alone
    /// whenever the cache reports a fault.
    async fn read_through<F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> ApiResult<Option<CacheRead>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AtriumResult<Option<Value>>>,
    {
        match self.cache.get_or_populate(key, &fetch).await {
            Ok(read) => Ok(read),
            Err(e) if e.is_cache_error() => {
                tracing::error!(key = %key, error = %e, "cache fault, reading from store");
                let now = self.clock.now();
                Ok(fetch().await?.map(|value| CacheRead::bypassed(value, now)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_object<R: StoreSelect>(
        &self,
        id: ResourceId,
        view: ViewKind,
    ) -> AtriumResult<Option<Value>> {
        let record = self.bounded("read", R::select(&self.stores).read(id)).await?;
        Ok(record.and_then(|record| record.project(view)))
    }

    async fn fetch_page<R: StoreSelect>(
        &self,
        query: &ListQuery,
        view: ViewKind,
    ) -> AtriumResult<Option<Value>> {
        let records = self
            .bounded(
                "list",
                R::select(&self.stores).list(&query.filter, &query.cursor),
            )
            .await?;
        let items: Vec<Value> = records
            .iter()
            .filter_map(|record| record.project(view))
            .collect();
        Ok(Some(json!({
            "items": items,
            "limit": query.cursor.limit,
            "offset": query.cursor.offset,
        })))
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Create a record. Admins only.
    ///
    /// A password on the input becomes a `user`-role credential for the new
    /// record once the record itself is stored.
    pub async fn create<R: StoreSelect>(
        &self,
        token: Option<&str>,
        mut draft: R::Draft,
    ) -> ApiResult<Written> {
        let principal = self.principal(token).await?;
        let view = view::authorize_create(R::KIND, principal.as_ref())?;

        let password = R::take_password(&mut draft);
        if password.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ApiError::missing_field("password"));
        }

        let record = self
            .write("create", R::select(&self.stores).create(draft))
            .await?;
        self.invalidate_after_write(&record);

        if let Some(password) = password {
            let id = record.id();
            let hash = self.verifier.hash_password(&password);
            self.write(
                "set_password",
                self.stores.credentials.set_password(id, hash, Role::User),
            )
            .await?;
            tracing::info!(target: AUDIT_TARGET, %id, "credential stored");
        }
        written(&record, view)
    }

    /// Apply a partial update. Owners and admins only.
    pub async fn update<R: StoreSelect>(
        &self,
        token: Option<&str>,
        id: ResourceId,
        patch: R::Patch,
    ) -> ApiResult<Written> {
        let principal = self.principal(token).await?;
        let owner = R::owner_of(id);
        let view = view::authorize_mutation(R::KIND, owner.as_deref(), principal.as_ref())?;

        let record = self
            .write("update", R::select(&self.stores).update(id, patch))
            .await?
            .ok_or_else(|| ApiError::not_found(R::KIND, id))?;
        self.invalidate_after_write(&record);
        written(&record, view)
    }

    /// Delete a record. Owners and admins only.
    pub async fn delete<R: StoreSelect>(
        &self,
        token: Option<&str>,
        id: ResourceId,
    ) -> ApiResult<()> {
        let principal = self.principal(token).await?;
        let owner = R::owner_of(id);
        view::authorize_mutation(R::KIND, owner.as_deref(), principal.as_ref())?;

        let removed = self
            .write("delete", R::select(&self.stores).delete(id))
            .await?;
        if !removed {
            return Err(ApiError::not_found(R::KIND, id));
        }
        if let Err(e) = self.cache.invalidate_resource(R::KIND, id) {
            let kind = R::KIND;
            tracing::error!(%kind, %id, error = %e, "invalidation after delete failed");
        }
        Ok(())
    }

    /// Run a store write under the timeout. A timeout leaves the outcome
    /// unknown, so the caller must not invalidate and may retry.
    async fn write<T, F>(&self, operation: &'static str, fut: F) -> ApiResult<T>
    where
        F: Future<Output = AtriumResult<T>>,
    {
        match self.bounded(operation, fut).await {
            Ok(value) => Ok(value),
            Err(AtriumError::Storage(StorageError::Timeout { .. })) => {
                tracing::warn!(operation, timeout = ?self.store_timeout, "store write timed out, outcome unknown");
                Err(ApiError::timeout(operation))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn invalidate_after_write<R: Resource>(&self, record: &R) {
        // A failed invalidation disables the cache, so reads stay correct.
        let (kind, id) = (R::KIND, record.id());
        if let Err(e) = self.cache.invalidate_resource(kind, id) {
            tracing::error!(%kind, %id, error = %e, "invalidation after write failed");
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> AtriumResult<T>
    where
        F: Future<Output = AtriumResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation: operation.to_string(),
                elapsed: self.store_timeout,
            }
            .into()),
        }
    }

    // ========================================================================
    // CREDENTIAL EXCHANGE
    // ========================================================================

    /// Exchange a username and password for a token.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<IssuedToken> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ApiError::missing_field("username"));
        }
        let credential = self
            .bounded(
                "find_credentials",
                self.stores.credentials.find_credentials(username),
            )
            .await?;

        match check_credentials(self.verifier.as_ref(), credential.as_ref(), password) {
            Ok(credential) => self
                .tokens
                .issue(&credential.user_id.to_string(), credential.role),
            Err(e) => {
                tracing::info!(target: AUDIT_TARGET, username, "login rejected");
                Err(e.into())
            }
        }
    }
}

fn written<R: Resource>(record: &R, view: ViewKind) -> ApiResult<Written> {
    let body = view::project(record, view)?;
    Ok(Written {
        id: record.id(),
        etag: ETag::of(&body),
        body,
    })
}
