//! Projection-scoped cache keys and invalidation predicates.
//!
//! A [`CacheKey`] can only be built through [`CacheKey::object`] or
//! [`CacheKey::list`], both of which demand the viewer's [`ViewKind`]. An
//! admin payload and a public payload of the same record can therefore never
//! share a slot.

use atrium_core::{Cursor, ListFilter, ListQuery, ResourceId, ResourceKind, ViewKind};
use std::fmt;

/// Location of a cached value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Private inner data - cannot be constructed externally
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    kind: ResourceKind,
    view: ViewKind,
    target: KeyTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyTarget {
    Object(ResourceId),
    List { filter: ListFilter, cursor: Cursor },
}

impl CacheKey {
    /// Key for a single record as seen through `view`.
    pub fn object(kind: ResourceKind, id: ResourceId, view: ViewKind) -> Self {
        Self {
            inner: KeyInner {
                kind,
                view,
                target: KeyTarget::Object(id),
            },
        }
    }

    /// Key for one page of a list query as seen through `view`.
    ///
    /// The filter inside a [`ListQuery`] is already normalized, so equivalent
    /// queries land on the same key.
    pub fn list(query: &ListQuery, view: ViewKind) -> Self {
        Self {
            inner: KeyInner {
                kind: query.kind,
                view,
                target: KeyTarget::List {
                    filter: query.filter.clone(),
                    cursor: query.cursor,
                },
            },
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    pub fn view(&self) -> ViewKind {
        self.inner.view
    }

    /// Record id for object keys, `None` for list keys.
    pub fn resource_id(&self) -> Option<ResourceId> {
        match &self.inner.target {
            KeyTarget::Object(id) => Some(*id),
            KeyTarget::List { .. } => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.inner.target, KeyTarget::List { .. })
    }

    /// Invalidation scopes that cover this key, narrowest first.
    pub fn covering_scopes(&self) -> [Invalidation; 3] {
        let kind = self.inner.kind;
        let narrow = match &self.inner.target {
            KeyTarget::Object(id) => Invalidation::Resource { kind, id: *id },
            KeyTarget::List { .. } => Invalidation::ListNamespace { kind },
        };
        [narrow, Invalidation::Kind { kind }, Invalidation::Everything]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.target {
            KeyTarget::Object(id) => write!(f, "{}:{}@{}", self.inner.kind, id, self.inner.view),
            KeyTarget::List { filter, cursor } => {
                let digest = ListQuery::new(self.inner.kind, filter.clone(), *cursor).digest();
                write!(f, "{}:list:{}@{}", self.inner.kind, &digest[..12], self.inner.view)
            }
        }
    }
}

/// Structural predicate selecting cache entries to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invalidation {
    /// Every projection of one record.
    Resource { kind: ResourceKind, id: ResourceId },
    /// Every cached list page of a kind.
    ListNamespace { kind: ResourceKind },
    /// Everything of a kind, objects and lists.
    Kind { kind: ResourceKind },
    Everything,
}

impl Invalidation {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            Invalidation::Resource { kind, id } => {
                key.kind() == *kind && key.resource_id() == Some(*id)
            }
            Invalidation::ListNamespace { kind } => key.kind() == *kind && key.is_list(),
            Invalidation::Kind { kind } => key.kind() == *kind,
            Invalidation::Everything => true,
        }
    }

    /// Whether the predicate can touch object entries.
    pub fn touches_objects(&self) -> bool {
        !matches!(self, Invalidation::ListNamespace { .. })
    }

    /// Whether the predicate can touch list entries.
    pub fn touches_lists(&self) -> bool {
        !matches!(self, Invalidation::Resource { .. })
    }
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invalidation::Resource { kind, id } => write!(f, "{}:{}", kind, id),
            Invalidation::ListNamespace { kind } => write!(f, "{}:list:*", kind),
            Invalidation::Kind { kind } => write!(f, "{}:*", kind),
            Invalidation::Everything => f.write_str("*"),
        }
    }
}
