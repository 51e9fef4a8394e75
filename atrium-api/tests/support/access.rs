//! Shared wiring for access-layer integration tests.
//!
//! Builds a coordinator over an in-memory store and a manual clock, with
//! optional fault-injecting replacements for the address store and the
//! cache backend.

#![allow(dead_code)]

use atrium_api::{
    AccessCoordinator, AuthConfig, InMemoryRevocationList, IssuedToken, JwtSecret,
    PasswordVerifier, Stores, TokenService,
};
use atrium_core::{test_clocks, Address, Clock, ManualClock, Role};
use atrium_storage::{
    CacheBackend, CacheConfig, CacheManager, InMemoryStore, ResourceStore, StoredCredential,
};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SECRET: &str = "integration-test-secret-integration-test";

/// Accepts a password when it equals the stored hash.
#[derive(Debug, Default)]
pub struct PlaintextVerifier;

impl PasswordVerifier for PlaintextVerifier {
    fn verify(&self, password: &str, hash: &str) -> bool {
        password == hash
    }

    fn hash_password(&self, password: &str) -> String {
        password.to_string()
    }
}

pub struct Harness {
    pub access: AccessCoordinator,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub revocations: Arc<InMemoryRevocationList>,
}

impl Harness {
    pub fn token(&self, subject: &str, role: Role) -> IssuedToken {
        self.access
            .tokens()
            .issue(subject, role)
            .expect("token issue")
    }

    pub fn admin(&self) -> String {
        self.token("root", Role::Admin).access_token
    }

    pub fn add_credential(&self, username: &str, password: &str, role: Role) -> uuid::Uuid {
        let user_id = uuid::Uuid::now_v7();
        self.store
            .insert_credential(StoredCredential {
                user_id,
                username: username.to_string(),
                password_hash: password.to_string(),
                role,
            })
            .expect("credential");
        user_id
    }
}

pub struct HarnessBuilder {
    addresses: Option<Arc<dyn ResourceStore<Address>>>,
    backend: Option<Arc<dyn CacheBackend>>,
    cache: CacheConfig,
    store_timeout: Duration,
    token_lifetime_secs: i64,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            addresses: None,
            backend: None,
            cache: CacheConfig::default(),
            store_timeout: Duration::from_secs(1),
            token_lifetime_secs: 3600,
        }
    }
}

impl HarnessBuilder {
    /// Serve addresses from `store` instead of the shared in-memory store.
    pub fn addresses(mut self, store: Arc<dyn ResourceStore<Address>>) -> Self {
        self.addresses = Some(store);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn token_lifetime_secs(mut self, secs: i64) -> Self {
        self.token_lifetime_secs = secs;
        self
    }

    /// Shared store and clock, for callers that wrap the store themselves.
    pub fn parts() -> (Arc<InMemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch_secs(test_clocks::VALID_EPOCH));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        (store, clock)
    }

    pub fn build(self) -> Harness {
        let (store, clock) = Self::parts();
        self.build_with(store, clock)
    }

    pub fn build_with(self, store: Arc<InMemoryStore>, clock: Arc<ManualClock>) -> Harness {
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let config = AuthConfig {
            jwt_secret: JwtSecret::new(TEST_SECRET).expect("secret"),
            token_lifetime_secs: self.token_lifetime_secs,
            ..AuthConfig::default()
        }
        .with_clock(dyn_clock.clone());

        let revocations = Arc::new(InMemoryRevocationList::new());
        let tokens = TokenService::new(config, revocations.clone());

        let cache = match self.backend {
            Some(backend) => CacheManager::with_backend(backend, self.cache, dyn_clock),
            None => CacheManager::with_clock(self.cache, dyn_clock),
        };

        let mut stores = Stores::in_memory(store.clone());
        if let Some(addresses) = self.addresses {
            stores.addresses = addresses;
        }

        let access = AccessCoordinator::new(
            tokens,
            Arc::new(cache),
            stores,
            Arc::new(PlaintextVerifier),
            self.store_timeout,
        );

        Harness {
            access,
            store,
            clock,
            revocations,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::default().build()
}
