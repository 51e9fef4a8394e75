//! Entity tags over projected values.
//!
//! A tag is the SHA-256 of a canonical JSON encoding in which object keys
//! are sorted, so it depends on content only, never on map insertion order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Strong entity tag. Stored unquoted; [`ETag::header_value`] adds quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Tag of a projected value.
    pub fn of(value: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted form for an `ETag` response header.
    pub fn header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// Shorthand for [`ETag::of`].
pub fn tag_of(value: &Value) -> ETag {
    ETag::of(value)
}

/// Outcome of comparing a client's conditional header with the current tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagValidation {
    /// Client copy is current; answer "not modified" without a body.
    Fresh,
    /// Client copy is missing or outdated; send the full body.
    Stale,
}

/// Compare an `If-None-Match` header value against the current tag.
///
/// Accepts `*`, comma-separated lists, quoted or bare tags, and weak (`W/`)
/// tags compared by their opaque value.
pub fn validate(client: Option<&str>, current: &ETag) -> TagValidation {
    let Some(header) = client else {
        return TagValidation::Stale;
    };
    let fresh = header.split(',').map(str::trim).any(|candidate| {
        if candidate == "*" {
            return true;
        }
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        let candidate = candidate.trim_matches('"');
        !candidate.is_empty() && candidate == current.as_str()
    });
    if fresh {
        TagValidation::Fresh
    } else {
        TagValidation::Stale
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
