//! Enum types for Atrium resources and viewers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Resource type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    User,
    Address,
}

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::User, ResourceKind::Address];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Address => "address",
        }
    }

    /// Collection name, as used in paths.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::User => "users",
            ResourceKind::Address => "addresses",
        }
    }

    /// Whether an anonymous caller is turned away before any projection is chosen.
    pub fn requires_authentication(&self) -> bool {
        match self {
            ResourceKind::User => false,
            ResourceKind::Address => true,
        }
    }

    /// Whether non-owners have a public projection to fall back on.
    pub fn has_public_view(&self) -> bool {
        match self {
            ResourceKind::User => true,
            ResourceKind::Address => false,
        }
    }

    /// Fields accepted in a list filter for this kind.
    pub fn filter_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::User => &["username", "email", "phone", "city", "country"],
            ResourceKind::Address => &["street", "city", "state", "postal_code", "country"],
        }
    }
}

/// Role carried by an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Shape of a resource handed to a particular viewer.
///
/// Ordered from least to most revealing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Public,
    Private,
    Admin,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::Public, ViewKind::Private, ViewKind::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Public => "public",
            ViewKind::Private => "private",
            ViewKind::Admin => "admin",
        }
    }

    /// Private and admin views carry mutation rights.
    pub fn grants_mutation(&self) -> bool {
        matches!(self, ViewKind::Private | ViewKind::Admin)
    }
}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "user" | "users" => Ok(ResourceKind::User),
            "address" | "addresses" => Ok(ResourceKind::Address),
            _ => Err(format!("Invalid ResourceKind: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid Role: {}", s)),
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
