//! User and Address records plus their create/patch inputs.

use crate::{ResourceId, Timestamp, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address copy embedded in a user record.
///
/// Embedded addresses are values, not references to [`Address`] records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedAddress {
    pub street: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: ResourceId,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub addresses: Vec<EmbeddedAddress>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An address record. Addresses have no owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: ResourceId,
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// INPUTS
// ============================================================================

/// Input for creating a user.
///
/// `password`, when given, becomes the user's login credential. It is never
/// part of the record and never serialized back out.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub addresses: Vec<EmbeddedAddress>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("birth_date", &self.birth_date)
            .field("avatar_url", &self.avatar_url)
            .field("addresses", &self.addresses)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Partial update of a user. Absent fields are left untouched; an explicit
/// `null` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    #[serde(default)]
    pub addresses: Option<Vec<EmbeddedAddress>>,
}

/// Input for creating an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAddress {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Partial update of an address. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPatch {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub state: Option<Option<String>>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// `Option<Option<T>>` fields: a missing key is `None`, `null` is
/// `Some(None)`.
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self == &UserPatch::default()
    }
}

impl AddressPatch {
    pub fn is_empty(&self) -> bool {
        self == &AddressPatch::default()
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_email(value: &str) -> Result<(), ValidationError> {
    require_text("email", value)?;
    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    if local.is_empty() || domain.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "email".to_string(),
            reason: "expected local@domain".to_string(),
        });
    }
    Ok(())
}

fn validate_embedded(addresses: &[EmbeddedAddress]) -> Result<(), ValidationError> {
    for address in addresses {
        require_text("addresses.street", &address.street)?;
        require_text("addresses.city", &address.city)?;
        require_text("addresses.postal_code", &address.postal_code)?;
        require_text("addresses.country", &address.country)?;
    }
    Ok(())
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("username", &self.username)?;
        require_email(&self.email)?;
        if let Some(password) = &self.password {
            require_text("password", password)?;
        }
        validate_embedded(&self.addresses)
    }
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(username) = &self.username {
            require_text("username", username)?;
        }
        if let Some(email) = &self.email {
            require_email(email)?;
        }
        if let Some(addresses) = &self.addresses {
            validate_embedded(addresses)?;
        }
        Ok(())
    }
}

impl NewAddress {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("street", &self.street)?;
        require_text("city", &self.city)?;
        require_text("postal_code", &self.postal_code)?;
        require_text("country", &self.country)
    }
}

impl AddressPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("street", &self.street),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if let Some(value) = value {
                require_text(field, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user() -> NewUser {
        NewUser {
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            birth_date: None,
            avatar_url: None,
            addresses: vec![],
            password: None,
        }
    }

    #[test]
    fn test_new_user_requires_username() {
        let mut input = new_user();
        input.username = "  ".to_string();
        assert_eq!(
            input.validate(),
            Err(ValidationError::RequiredFieldMissing {
                field: "username".to_string()
            })
        );
    }

    #[test]
    fn test_new_user_rejects_bad_email() {
        let mut input = new_user();
        input.email = "ada.example.com".to_string();
        assert!(matches!(
            input.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
        input.email = "@example.com".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_empty_patches() {
        assert!(UserPatch::default().is_empty());
        assert!(AddressPatch::default().is_empty());
        let patch = AddressPatch {
            city: Some("Y".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_new_user_password_is_redacted_and_never_serialized() {
        let mut input = new_user();
        input.password = Some("hunter2".to_string());
        assert!(!format!("{:?}", input).contains("hunter2"));
        let json = serde_json::to_value(&input).unwrap();
        assert!(json.get("password").is_none());

        input.password = Some(" ".to_string());
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_new_user_accepts_password_on_input() {
        let input: NewUser = serde_json::from_value(serde_json::json!({
            "username": "ada",
            "email": "ada@example.com",
            "password": "hunter2",
        }))
        .unwrap();
        assert_eq!(input.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_patch_tells_absent_from_null() {
        let absent: UserPatch = serde_json::from_str(r#"{"email": "a@b.c"}"#).unwrap();
        assert_eq!(absent.phone, None);

        let cleared: UserPatch = serde_json::from_str(r#"{"phone": null}"#).unwrap();
        assert_eq!(cleared.phone, Some(None));
        assert!(!cleared.is_empty());

        let set: UserPatch = serde_json::from_str(r#"{"phone": "555"}"#).unwrap();
        assert_eq!(set.phone, Some(Some("555".to_string())));

        let state: AddressPatch = serde_json::from_str(r#"{"state": null}"#).unwrap();
        assert_eq!(state.state, Some(None));
    }

    #[test]
    fn test_cleared_field_serializes_as_null() {
        let patch = UserPatch {
            avatar_url: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json.get("avatar_url"), Some(&serde_json::Value::Null));
        assert!(json.get("phone").is_none());
    }

    #[test]
    fn test_address_patch_rejects_blank_required_field() {
        let patch = AddressPatch {
            country: Some(String::new()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }
}
