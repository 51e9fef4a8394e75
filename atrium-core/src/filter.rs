//! List filters and page cursors
//!
//! A [`ListQuery`] is the pre-parsed form of a list request. Filters are
//! normalized on construction so that semantically identical queries compare
//! (and hash) equal regardless of the order or casing they arrived in.

use crate::{ResourceKind, ValidationError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Equality filter over a resource kind's filterable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListFilter {
    fields: BTreeMap<String, String>,
}

impl ListFilter {
    /// Filter that matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a normalized filter for `kind`.
    ///
    /// Field names are trimmed and lower-cased, values are trimmed, and pairs
    /// with an empty value are dropped. Unknown fields are rejected, as is the
    /// same field given twice with different values.
    pub fn normalized<I, K, V>(kind: ResourceKind, pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let allowed = kind.filter_fields();
        let mut fields = BTreeMap::new();
        for (field, value) in pairs {
            let field = field.as_ref().trim().to_ascii_lowercase();
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            if !allowed.contains(&field.as_str()) {
                return Err(ValidationError::UnknownFilterField { kind, field });
            }
            if let Some(previous) = fields.insert(field.clone(), value.to_string()) {
                if previous != value {
                    return Err(ValidationError::InvalidValue {
                        field,
                        reason: "given more than once with different values".to_string(),
                    });
                }
            }
        }
        Ok(Self { fields })
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Offset/limit page cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    pub limit: u32,
    pub offset: u64,
}

impl Cursor {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(limit: u32, offset: u64) -> Result<Self, ValidationError> {
        if limit == 0 || limit > Self::MAX_LIMIT {
            return Err(ValidationError::InvalidValue {
                field: "limit".to_string(),
                reason: format!("must be between 1 and {}", Self::MAX_LIMIT),
            });
        }
        Ok(Self { limit, offset })
    }

    /// Slice bounds into a result set of `len` items.
    pub fn window(&self, len: usize) -> std::ops::Range<usize> {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(self.limit as usize).min(len);
        start..end
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// A fully parsed list request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListQuery {
    pub kind: ResourceKind,
    pub filter: ListFilter,
    pub cursor: Cursor,
}

impl ListQuery {
    pub fn new(kind: ResourceKind, filter: ListFilter, cursor: Cursor) -> Self {
        Self {
            kind,
            filter,
            cursor,
        }
    }

    /// Everything of `kind`, first page.
    pub fn all(kind: ResourceKind) -> Self {
        Self::new(kind, ListFilter::any(), Cursor::default())
    }

    /// Parse flat query parameters. `limit` and `offset` feed the cursor and
    /// every other pair becomes a filter field.
    pub fn from_params<I, K, V>(kind: ResourceKind, params: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut limit = Cursor::DEFAULT_LIMIT;
        let mut offset = 0u64;
        let mut rest = Vec::new();
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key.trim() {
                "limit" => limit = parse_number("limit", value)?,
                "offset" => offset = parse_number("offset", value)?,
                _ => rest.push((key.to_string(), value.to_string())),
            }
        }
        Ok(Self::new(
            kind,
            ListFilter::normalized(kind, rest)?,
            Cursor::new(limit, offset)?,
        ))
    }

    /// Stable hex digest of the filter and cursor, for logs and key display.
    pub fn digest(&self) -> String {
        let canonical = serde_json::json!({
            "filters": &self.filter,
            "limit": self.cursor.limit,
            "offset": self.cursor.offset,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ValidationError> {
    raw.trim().parse().map_err(|_| ValidationError::InvalidValue {
        field: field.to_string(),
        reason: format!("not a number: {}", raw),
    })
}
