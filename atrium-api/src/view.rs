//! Role-based view resolution.
//!
//! Every function here is pure: the answer depends only on the resource
//! kind, the owner subject and the principal.
//!
//! Policy, first match wins:
//! 1. anonymous caller and the kind requires authentication: `Unauthenticated`
//! 2. admin: [`ViewKind::Admin`]
//! 3. caller owns the record: [`ViewKind::Private`]
//! 4. otherwise [`ViewKind::Public`], or `Forbidden` when the kind has no public view

use atrium_core::{Principal, Resource, ResourceId, ResourceKind, ViewKind};
use serde_json::Value;
use thiserror::Error;

/// Why a principal was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Pick the projection `principal` may see of a `kind` record owned by `owner`.
pub fn resolve(
    kind: ResourceKind,
    owner: Option<&str>,
    principal: Option<&Principal>,
) -> Result<ViewKind, AccessDenied> {
    let Some(principal) = principal else {
        if kind.requires_authentication() {
            return Err(AccessDenied::Unauthenticated);
        }
        return public_or_forbidden(kind);
    };
    if principal.is_admin() {
        return Ok(ViewKind::Admin);
    }
    if principal.owns(owner) {
        return Ok(ViewKind::Private);
    }
    public_or_forbidden(kind)
}

/// [`resolve`] for the record of type `R` with the given id.
pub fn resolve_for<R: Resource>(
    id: ResourceId,
    principal: Option<&Principal>,
) -> Result<ViewKind, AccessDenied> {
    resolve(R::KIND, R::owner_of(id).as_deref(), principal)
}

/// View used for every item of a list page.
///
/// Lists mix owners, so nobody but an admin gets more than the public view.
pub fn resolve_list(
    kind: ResourceKind,
    principal: Option<&Principal>,
) -> Result<ViewKind, AccessDenied> {
    match principal {
        None if kind.requires_authentication() => Err(AccessDenied::Unauthenticated),
        Some(p) if p.is_admin() => Ok(ViewKind::Admin),
        _ => public_or_forbidden(kind),
    }
}

/// Update and delete rights: whatever view grants mutation.
pub fn authorize_mutation(
    kind: ResourceKind,
    owner: Option<&str>,
    principal: Option<&Principal>,
) -> Result<ViewKind, AccessDenied> {
    if principal.is_none() {
        return Err(AccessDenied::Unauthenticated);
    }
    let view = resolve(kind, owner, principal)?;
    if view.grants_mutation() {
        Ok(view)
    } else {
        Err(AccessDenied::Forbidden(format!(
            "cannot modify this {}",
            kind
        )))
    }
}

/// Creating records is reserved for admins.
pub fn authorize_create(
    kind: ResourceKind,
    principal: Option<&Principal>,
) -> Result<ViewKind, AccessDenied> {
    match principal {
        None => Err(AccessDenied::Unauthenticated),
        Some(p) if p.is_admin() => Ok(ViewKind::Admin),
        Some(_) => Err(AccessDenied::Forbidden(format!(
            "only admins may create a {}",
            kind
        ))),
    }
}

/// Shape `record` for `view`.
pub fn project<R: Resource>(record: &R, view: ViewKind) -> Result<Value, AccessDenied> {
    record.project(view).ok_or_else(|| {
        AccessDenied::Forbidden(format!("no {} view of {}", view.as_str(), R::KIND))
    })
}

fn public_or_forbidden(kind: ResourceKind) -> Result<ViewKind, AccessDenied> {
    if kind.has_public_view() {
        Ok(ViewKind::Public)
    } else {
        Err(AccessDenied::Forbidden(format!(
            "{} records are visible to admins only",
            kind
        )))
    }
}
