//! The [`Resource`] abstraction shared by stores, caches and the view resolver.

use crate::{
    Address, AddressPatch, ListFilter, NewAddress, NewUser, ResourceId, ResourceKind, Role,
    Timestamp, User, UserPatch, ValidationError, ViewKind,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Debug;

/// A record type exposed through the access layer.
pub trait Resource: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Create input.
    type Draft: Clone + Debug + Send + Sync + 'static;
    /// Partial update input.
    type Patch: Clone + Debug + Send + Sync + 'static;

    const KIND: ResourceKind;

    fn id(&self) -> ResourceId;

    fn created_at(&self) -> Timestamp;

    /// Subject that owns the record with this id, if the kind has owners.
    ///
    /// Ownership must be derivable from the id alone so views can be chosen
    /// before the record is fetched.
    fn owner_of(id: ResourceId) -> Option<String>;

    /// Shape the record for a viewer. `None` when the kind has no such view.
    fn project(&self, view: ViewKind) -> Option<Value>;

    fn matches(&self, filter: &ListFilter) -> bool;

    fn from_draft(draft: Self::Draft, id: ResourceId, now: Timestamp) -> Result<Self, ValidationError>;

    /// Apply a patch in place, returning whether anything changed.
    fn apply_patch(&mut self, patch: Self::Patch, now: Timestamp) -> Result<bool, ValidationError>;
}

/// Authenticated identity reconstructed from a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
    /// Token expiry, epoch seconds.
    pub expires_at: i64,
    /// Token id, used for revocation lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, role: Role, expires_at: i64) -> Self {
        Self {
            subject: subject.into(),
            role,
            expires_at,
            token_id: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, owner: Option<&str>) -> bool {
        owner.is_some_and(|owner| owner == self.subject)
    }
}

// ============================================================================
// USER
// ============================================================================

fn set_if_changed<T: PartialEq>(slot: &mut T, value: Option<T>, changed: &mut bool) {
    if let Some(value) = value {
        if *slot != value {
            *slot = value;
            *changed = true;
        }
    }
}

impl Resource for User {
    type Draft = NewUser;
    type Patch = UserPatch;

    const KIND: ResourceKind = ResourceKind::User;

    fn id(&self) -> ResourceId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn owner_of(id: ResourceId) -> Option<String> {
        Some(id.to_string())
    }

    fn project(&self, view: ViewKind) -> Option<Value> {
        let mut out = Map::new();
        out.insert("id".into(), json!(self.id));
        out.insert("username".into(), json!(self.username));
        out.insert("avatar_url".into(), json!(self.avatar_url));
        if view >= ViewKind::Private {
            out.insert("email".into(), json!(self.email));
            out.insert("phone".into(), json!(self.phone));
            out.insert("birth_date".into(), json!(self.birth_date));
            out.insert("addresses".into(), json!(self.addresses));
        }
        if view == ViewKind::Admin {
            out.insert("created_at".into(), json!(self.created_at));
            out.insert("updated_at".into(), json!(self.updated_at));
        }
        Some(Value::Object(out))
    }

    fn matches(&self, filter: &ListFilter) -> bool {
        filter.iter().all(|(field, value)| match field {
            "username" => self.username == value,
            "email" => self.email == value,
            "phone" => self.phone.as_deref() == Some(value),
            "city" => self.addresses.iter().any(|a| a.city == value),
            "country" => self.addresses.iter().any(|a| a.country == value),
            _ => false,
        })
    }

    fn from_draft(draft: NewUser, id: ResourceId, now: Timestamp) -> Result<Self, ValidationError> {
        draft.validate()?;
        Ok(User {
            id,
            username: draft.username,
            email: draft.email,
            phone: draft.phone,
            birth_date: draft.birth_date,
            avatar_url: draft.avatar_url,
            addresses: draft.addresses,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&mut self, patch: UserPatch, now: Timestamp) -> Result<bool, ValidationError> {
        patch.validate()?;
        let mut changed = false;
        set_if_changed(&mut self.username, patch.username, &mut changed);
        set_if_changed(&mut self.email, patch.email, &mut changed);
        set_if_changed(&mut self.phone, patch.phone, &mut changed);
        set_if_changed(&mut self.birth_date, patch.birth_date, &mut changed);
        set_if_changed(&mut self.avatar_url, patch.avatar_url, &mut changed);
        set_if_changed(&mut self.addresses, patch.addresses, &mut changed);
        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }
}

// ============================================================================
// ADDRESS
// ============================================================================

impl Resource for Address {
    type Draft = NewAddress;
    type Patch = AddressPatch;

    const KIND: ResourceKind = ResourceKind::Address;

    fn id(&self) -> ResourceId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn owner_of(_id: ResourceId) -> Option<String> {
        None
    }

    fn project(&self, view: ViewKind) -> Option<Value> {
        if view == ViewKind::Public {
            return None;
        }
        let mut out = Map::new();
        out.insert("id".into(), json!(self.id));
        out.insert("street".into(), json!(self.street));
        out.insert("city".into(), json!(self.city));
        out.insert("state".into(), json!(self.state));
        out.insert("postal_code".into(), json!(self.postal_code));
        out.insert("country".into(), json!(self.country));
        if view == ViewKind::Admin {
            out.insert("created_at".into(), json!(self.created_at));
            out.insert("updated_at".into(), json!(self.updated_at));
        }
        Some(Value::Object(out))
    }

    fn matches(&self, filter: &ListFilter) -> bool {
        filter.iter().all(|(field, value)| match field {
            "street" => self.street == value,
            "city" => self.city == value,
            "state" => self.state.as_deref() == Some(value),
            "postal_code" => self.postal_code == value,
            "country" => self.country == value,
            _ => false,
        })
    }

    fn from_draft(draft: NewAddress, id: ResourceId, now: Timestamp) -> Result<Self, ValidationError> {
        draft.validate()?;
        Ok(Address {
            id,
            street: draft.street,
            city: draft.city,
            state: draft.state,
            postal_code: draft.postal_code,
            country: draft.country,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&mut self, patch: AddressPatch, now: Timestamp) -> Result<bool, ValidationError> {
        patch.validate()?;
        let mut changed = false;
        set_if_changed(&mut self.street, patch.street, &mut changed);
        set_if_changed(&mut self.city, patch.city, &mut changed);
        set_if_changed(&mut self.state, patch.state, &mut changed);
        set_if_changed(&mut self.postal_code, patch.postal_code, &mut changed);
        set_if_changed(&mut self.country, patch.country, &mut changed);
        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmbeddedAddress;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn now() -> Timestamp {
        Utc.timestamp_opt(1_704_067_200, 0).unwrap()
    }

    fn user() -> User {
        User::from_draft(
            NewUser {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: Some("555-0100".to_string()),
                birth_date: None,
                avatar_url: None,
                password: None,
                addresses: vec![EmbeddedAddress {
                    street: "1 Main St".to_string(),
                    city: "Paris".to_string(),
                    state: None,
                    postal_code: "75001".to_string(),
                    country: "FR".to_string(),
                }],
            },
            Uuid::from_u128(7),
            now(),
        )
        .unwrap()
    }

    fn address() -> Address {
        Address::from_draft(
            NewAddress {
                street: "1 Main St".to_string(),
                city: "X".to_string(),
                state: None,
                postal_code: "00042".to_string(),
                country: "US".to_string(),
            },
            Uuid::from_u128(42),
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_user_public_projection_hides_contact_details() {
        let public = user().project(ViewKind::Public).unwrap();
        assert!(public.get("username").is_some());
        assert!(public.get("email").is_none());
        assert!(public.get("phone").is_none());
        assert!(public.get("created_at").is_none());
    }

    #[test]
    fn test_user_projections_are_nested() {
        let u = user();
        let private = u.project(ViewKind::Private).unwrap();
        let admin = u.project(ViewKind::Admin).unwrap();
        assert_eq!(private["email"], "ada@example.com");
        assert!(private.get("created_at").is_none());
        for (key, value) in private.as_object().unwrap() {
            assert_eq!(admin.get(key), Some(value));
        }
        assert!(admin.get("updated_at").is_some());
    }

    #[test]
    fn test_user_owner_is_its_own_id() {
        let u = user();
        assert_eq!(User::owner_of(u.id), Some(u.id.to_string()));
        assert_eq!(Address::owner_of(Uuid::from_u128(1)), None);
    }

    #[test]
    fn test_address_has_no_public_projection() {
        let a = address();
        assert!(a.project(ViewKind::Public).is_none());
        assert_eq!(a.project(ViewKind::Private).unwrap()["city"], "X");
    }

    #[test]
    fn test_user_filter_matches_embedded_address() {
        let u = user();
        let hit = ListFilter::normalized(ResourceKind::User, [("city", "Paris")]).unwrap();
        let miss = ListFilter::normalized(ResourceKind::User, [("city", "Lyon")]).unwrap();
        assert!(u.matches(&hit));
        assert!(!u.matches(&miss));
        assert!(u.matches(&ListFilter::any()));
    }

    #[test]
    fn test_patch_updates_timestamp_only_on_change() {
        let mut a = address();
        let later = now() + chrono::Duration::seconds(30);

        let unchanged = a
            .apply_patch(AddressPatch { city: Some("X".to_string()), ..Default::default() }, later)
            .unwrap();
        assert!(!unchanged);
        assert_eq!(a.updated_at, now());

        let changed = a
            .apply_patch(AddressPatch { city: Some("Y".to_string()), ..Default::default() }, later)
            .unwrap();
        assert!(changed);
        assert_eq!(a.city, "Y");
        assert_eq!(a.updated_at, later);
    }

    #[test]
    fn test_null_in_patch_clears_nullable_fields() {
        let mut u = user();
        let later = now() + chrono::Duration::seconds(30);
        let patch: UserPatch = serde_json::from_str(r#"{"phone": null}"#).unwrap();
        assert!(u.apply_patch(patch, later).unwrap());
        assert_eq!(u.phone, None);
        assert_eq!(u.updated_at, later);

        // Clearing an already empty field is not a change.
        let again: UserPatch = serde_json::from_str(r#"{"avatar_url": null}"#).unwrap();
        assert!(!u.apply_patch(again, later + chrono::Duration::seconds(1)).unwrap());
        assert_eq!(u.updated_at, later);

        let mut a = address();
        a.state = Some("NH".to_string());
        let patch: AddressPatch = serde_json::from_str(r#"{"state": null}"#).unwrap();
        assert!(a.apply_patch(patch, later).unwrap());
        assert_eq!(a.state, None);
    }

    #[test]
    fn test_principal_ownership() {
        let p = Principal::new("u1", Role::User, 0);
        assert!(p.owns(Some("u1")));
        assert!(!p.owns(Some("u2")));
        assert!(!p.owns(None));
        assert!(!p.is_admin());
    }
}
