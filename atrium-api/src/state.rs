//! Shared application state for Axum routers.

use atrium_core::{Clock, Role, SystemClock};
use atrium_storage::{CacheManager, InMemoryStore, StoredCredential};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Instant;

use crate::access::{AccessCoordinator, Stores};
use crate::auth::{
    DigestPasswordVerifier, InMemoryRevocationList, PasswordVerifier, RevocationList, TokenService,
};
use crate::config::ServiceConfig;
use crate::error::ApiResult;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub access: AccessCoordinator,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(access: AccessCoordinator) -> Self {
        Self {
            access,
            start_time: Instant::now(),
        }
    }

    /// Wire a coordinator over the given collaborators.
    pub fn assemble(
        config: &ServiceConfig,
        stores: Stores,
        revocations: Arc<dyn RevocationList>,
        verifier: Arc<dyn PasswordVerifier>,
    ) -> Self {
        let clock: Arc<dyn Clock> = config.auth.clock.clone();
        let tokens = TokenService::new(config.auth.clone(), revocations);
        let cache = Arc::new(CacheManager::with_clock(config.cache.clone(), clock));
        Self::new(AccessCoordinator::new(
            tokens,
            cache,
            stores,
            verifier,
            config.store_timeout,
        ))
    }
}

/// In-memory deployment used by the binary: one store for every role, an
/// in-process revocation list and salted digest passwords. Seeds the admin
/// credential when one is configured.
pub fn in_memory_state(config: &ServiceConfig) -> ApiResult<(AppState, Arc<InMemoryStore>)> {
    let store = Arc::new(InMemoryStore::with_clock(Arc::new(SystemClock)));

    if let Some(admin) = &config.admin {
        store.insert_credential(StoredCredential {
            user_id: uuid::Uuid::now_v7(),
            username: admin.username.clone(),
            password_hash: DigestPasswordVerifier.hash_password(admin.password.expose_secret()),
            role: Role::Admin,
        })?;
        tracing::info!(username = %admin.username, "admin credential seeded");
    }

    let state = AppState::assemble(
        config,
        Stores::in_memory(store.clone()),
        Arc::new(InMemoryRevocationList::new()),
        Arc::new(DigestPasswordVerifier),
    );
    Ok((state, store))
}
