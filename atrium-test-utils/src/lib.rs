//! Atrium Test Utilities
//!
//! Shared test infrastructure for the Atrium workspace:
//! - Proptest generators for records, principals, filters and JSON values
//! - Fixtures for clocks, records, stores and caches
//! - Fault-injecting doubles for stores and cache backends

// Re-export core types for convenience
pub use atrium_core::{
    test_clocks, Address, AtriumError, AtriumResult, CacheError, Clock, Cursor, EmbeddedAddress,
    FixedClock, ListFilter, ListQuery, ManualClock, NewAddress, NewUser, Principal, Resource,
    ResourceId, ResourceKind, Role, StorageError, Timestamp, User, ViewKind,
};
pub use atrium_storage::{CacheManager, InMemoryStore, ResourceStore};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Atrium types.

    use super::*;
    use chrono::{NaiveDate, Utc};
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use uuid::Uuid;

    // === Identity and time ===

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate timestamps within a reasonable range (2020-2030).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (test_clocks::EXPIRED_EPOCH..test_clocks::FUTURE_EPOCH).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_birth_date() -> impl Strategy<Value = NaiveDate> {
        (1940i32..2010, 1u32..=12, 1u32..=28)
            .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    }

    // === Enums ===

    pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
        prop_oneof![Just(ResourceKind::User), Just(ResourceKind::Address)]
    }

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::User), Just(Role::Admin)]
    }

    pub fn arb_view_kind() -> impl Strategy<Value = ViewKind> {
        prop_oneof![
            Just(ViewKind::Public),
            Just(ViewKind::Private),
            Just(ViewKind::Admin)
        ]
    }

    // === Principals ===

    /// Subject identifiers: either record ids or short handles.
    pub fn arb_subject() -> impl Strategy<Value = String> {
        prop_oneof![
            arb_uuid().prop_map(|id| id.to_string()),
            "u[0-9]{1,3}".prop_map(|s| s),
        ]
    }

    pub fn arb_principal() -> impl Strategy<Value = Principal> {
        (arb_subject(), arb_role(), test_clocks::VALID_EPOCH..test_clocks::FUTURE_EPOCH)
            .prop_map(|(subject, role, expires_at)| Principal::new(subject, role, expires_at))
    }

    // === Records ===

    pub fn arb_email() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9.]{0,11}", "[a-z]{2,10}\\.(com|org|net)")
            .prop_map(|(local, domain)| format!("{}@{}", local, domain))
    }

    pub fn arb_embedded_address() -> impl Strategy<Value = EmbeddedAddress> {
        (
            "[0-9]{1,4} [A-Z][a-z]{2,10} St",
            "[A-Z][a-z]{2,10}",
            prop::option::of("[A-Z]{2}"),
            "[0-9]{4,6}",
            "[A-Z]{2}",
        )
            .prop_map(|(street, city, state, postal_code, country)| EmbeddedAddress {
                street,
                city,
                state,
                postal_code,
                country,
            })
    }

    pub fn arb_new_user() -> impl Strategy<Value = NewUser> {
        (
            "[a-z][a-z0-9_]{2,15}",
            arb_email(),
            prop::option::of("\\+[0-9]{8,12}"),
            prop::option::of(arb_birth_date()),
            prop::option::of("https://img\\.example\\.com/[a-z0-9]{4,12}\\.png"),
            prop::collection::vec(arb_embedded_address(), 0..3),
        )
            .prop_map(
                |(username, email, phone, birth_date, avatar_url, addresses)| NewUser {
                    username,
                    email,
                    phone,
                    birth_date,
                    avatar_url,
                    addresses,
                    password: None,
                },
            )
    }

    pub fn arb_new_address() -> impl Strategy<Value = NewAddress> {
        arb_embedded_address().prop_map(|a| NewAddress {
            street: a.street,
            city: a.city,
            state: a.state,
            postal_code: a.postal_code,
            country: a.country,
        })
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        (arb_uuid(), arb_new_user(), arb_timestamp()).prop_filter_map(
            "valid user draft",
            |(id, draft, now)| User::from_draft(draft, id, now).ok(),
        )
    }

    pub fn arb_address() -> impl Strategy<Value = Address> {
        (arb_uuid(), arb_new_address(), arb_timestamp()).prop_filter_map(
            "valid address draft",
            |(id, draft, now)| Address::from_draft(draft, id, now).ok(),
        )
    }

    // === Queries ===

    /// A normalized filter over a subset of the kind's filterable fields.
    pub fn arb_list_filter(kind: ResourceKind) -> impl Strategy<Value = ListFilter> {
        let fields = kind.filter_fields();
        prop::collection::vec((0..fields.len(), "[A-Za-z]{1,8}"), 0..3).prop_filter_map(
            "normalizable filter",
            move |pairs| {
                let mut seen = std::collections::BTreeSet::new();
                let pairs: Vec<(String, String)> = pairs
                    .into_iter()
                    .filter(|(i, _)| seen.insert(*i))
                    .map(|(i, v)| (fields[i].to_string(), v))
                    .collect();
                ListFilter::normalized(kind, pairs).ok()
            },
        )
    }

    pub fn arb_cursor() -> impl Strategy<Value = Cursor> {
        (1u32..=Cursor::MAX_LIMIT, 0u64..1_000)
            .prop_filter_map("valid cursor", |(limit, offset)| Cursor::new(limit, offset).ok())
    }

    pub fn arb_list_query() -> impl Strategy<Value = ListQuery> {
        arb_resource_kind().prop_flat_map(|kind| {
            (arb_list_filter(kind), arb_cursor())
                .prop_map(move |(filter, cursor)| ListQuery::new(kind, filter, cursor))
        })
    }

    // === JSON ===

    /// Small nested JSON documents.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Deterministic clocks, records, stores and caches.

    use super::*;
    use atrium_storage::CacheConfig;
    use std::sync::Arc;

    pub fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH))
    }

    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at_epoch_secs(test_clocks::VALID_EPOCH))
    }

    pub fn new_address(city: &str) -> NewAddress {
        NewAddress {
            street: "42 Harbour St".to_string(),
            city: city.to_string(),
            state: None,
            postal_code: "1011".to_string(),
            country: "NL".to_string(),
        }
    }

    pub fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            phone: Some("+31200000000".to_string()),
            birth_date: None,
            avatar_url: Some(format!("https://img.example.com/{}.png", username)),
            addresses: vec![EmbeddedAddress {
                street: "1 Canal St".to_string(),
                city: "Amsterdam".to_string(),
                state: None,
                postal_code: "1012".to_string(),
                country: "NL".to_string(),
            }],
            password: None,
        }
    }

    /// A stored address with a fixed id.
    pub fn address(id: ResourceId, city: &str) -> Address {
        let now = FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH).now();
        Address {
            id,
            street: "42 Harbour St".to_string(),
            city: city.to_string(),
            state: None,
            postal_code: "1011".to_string(),
            country: "NL".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A stored user with a fixed id.
    pub fn user(id: ResourceId, username: &str) -> User {
        let now = FixedClock::at_epoch_secs(test_clocks::VALID_EPOCH).now();
        let draft = new_user(username);
        User {
            id,
            username: draft.username,
            email: draft.email,
            phone: draft.phone,
            birth_date: draft.birth_date,
            avatar_url: draft.avatar_url,
            addresses: draft.addresses,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn store(clock: Arc<dyn Clock>) -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::with_clock(clock))
    }

    pub fn cache(clock: Arc<dyn Clock>) -> Arc<CacheManager> {
        Arc::new(CacheManager::with_clock(CacheConfig::default(), clock))
    }
}

// ============================================================================
// FAULT-INJECTING DOUBLES
// ============================================================================

pub mod doubles {
    //! Stores and cache backends that fail or stall on demand.

    use super::*;
    use async_trait::async_trait;
    use atrium_storage::{
        CacheBackend, CacheEntry, CacheKey, Invalidation, Lookup, MemoryCacheBackend,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What a [`FaultyStore`] does before delegating.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum Fault {
        #[default]
        None,
        /// Fail with `StorageError::Unavailable` without touching the inner store.
        Unavailable,
        /// Sleep, then delegate.
        Delay(Duration),
    }

    /// Wraps a store, counting calls and injecting faults per direction.
    pub struct FaultyStore<R: Resource> {
        inner: Arc<dyn ResourceStore<R>>,
        read_fault: Mutex<Fault>,
        write_fault: Mutex<Fault>,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl<R: Resource> FaultyStore<R> {
        pub fn new(inner: Arc<dyn ResourceStore<R>>) -> Self {
            Self {
                inner,
                read_fault: Mutex::new(Fault::None),
                write_fault: Mutex::new(Fault::None),
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }
        }

        /// Fault applied to `read` and `list`.
        pub fn set_read_fault(&self, fault: Fault) {
            if let Ok(mut slot) = self.read_fault.lock() {
                *slot = fault;
            }
        }

        /// Fault applied to `create`, `update` and `delete`.
        pub fn set_write_fault(&self, fault: Fault) {
            if let Ok(mut slot) = self.write_fault.lock() {
                *slot = fault;
            }
        }

        /// Calls to `read` and `list` that reached this wrapper.
        pub fn read_calls(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        pub fn write_calls(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        async fn gate(&self, fault: &Mutex<Fault>, counter: &AtomicUsize) -> AtriumResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            let fault = fault.lock().map(|f| *f).unwrap_or_default();
            match fault {
                Fault::None => Ok(()),
                Fault::Unavailable => Err(StorageError::Unavailable {
                    reason: "injected fault".to_string(),
                }
                .into()),
                Fault::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl<R: Resource> ResourceStore<R> for FaultyStore<R> {
        async fn create(&self, draft: R::Draft) -> AtriumResult<R> {
            self.gate(&self.write_fault, &self.writes).await?;
            self.inner.create(draft).await
        }

        async fn read(&self, id: ResourceId) -> AtriumResult<Option<R>> {
            self.gate(&self.read_fault, &self.reads).await?;
            self.inner.read(id).await
        }

        async fn update(&self, id: ResourceId, patch: R::Patch) -> AtriumResult<Option<R>> {
            self.gate(&self.write_fault, &self.writes).await?;
            self.inner.update(id, patch).await
        }

        async fn delete(&self, id: ResourceId) -> AtriumResult<bool> {
            self.gate(&self.write_fault, &self.writes).await?;
            self.inner.delete(id).await
        }

        async fn list(&self, filter: &ListFilter, cursor: &Cursor) -> AtriumResult<Vec<R>> {
            self.gate(&self.read_fault, &self.reads).await?;
            self.inner.list(filter, cursor).await
        }
    }

    /// In-memory LRU backend whose lookups or removals can be made to fail.
    #[derive(Debug)]
    pub struct FlakyCacheBackend {
        inner: MemoryCacheBackend,
        fail_lookups: AtomicBool,
        fail_removals: AtomicBool,
    }

    impl FlakyCacheBackend {
        pub fn new() -> Self {
            Self {
                inner: MemoryCacheBackend::new(128, 32),
                fail_lookups: AtomicBool::new(false),
                fail_removals: AtomicBool::new(false),
            }
        }

        pub fn fail_lookups(&self, fail: bool) {
            self.fail_lookups.store(fail, Ordering::SeqCst);
        }

        pub fn fail_removals(&self, fail: bool) {
            self.fail_removals.store(fail, Ordering::SeqCst);
        }

        fn injected(component: &'static str) -> AtriumError {
            CacheError::LockPoisoned { component }.into()
        }
    }

    impl Default for FlakyCacheBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CacheBackend for FlakyCacheBackend {
        fn lookup(&self, key: &CacheKey, now: Timestamp) -> AtriumResult<Lookup> {
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(Self::injected("lookup"));
            }
            self.inner.lookup(key, now)
        }

        fn insert(&self, entry: CacheEntry) -> AtriumResult<Option<CacheKey>> {
            self.inner.insert(entry)
        }

        fn remove_matching(&self, predicate: &Invalidation) -> AtriumResult<u64> {
            if self.fail_removals.load(Ordering::SeqCst) {
                return Err(Self::injected("remove_matching"));
            }
            self.inner.remove_matching(predicate)
        }

        fn len(&self) -> AtriumResult<usize> {
            self.inner.len()
        }
    }
}
