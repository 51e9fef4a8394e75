//! Error types for Atrium operations

use crate::ResourceKind;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// External store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: ResourceKind, id: Uuid },

    #[error("Insert failed for {kind}: {reason}")]
    InsertFailed { kind: ResourceKind, reason: String },

    #[error("Conflict on {kind}: {reason}")]
    Conflict { kind: ResourceKind, reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store operation {operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache layer errors.
///
/// None of these should surface during correct operation. Callers treat any
/// of them as a signal to bypass the cache for the current request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache invariant violated: {reason}")]
    Inconsistent { reason: String },

    #[error("Cache lock poisoned: {component}")]
    LockPoisoned { component: &'static str },

    #[error("Cached value could not be encoded: {reason}")]
    Encoding { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown filter field {field} for {kind}")]
    UnknownFilterField { kind: ResourceKind, field: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Atrium errors.
#[derive(Debug, Clone, Error)]
pub enum AtriumError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl AtriumError {
    /// Whether the failure came from the cache rather than the authoritative store.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, AtriumError::Cache(_))
    }
}

/// Result type alias for Atrium operations.
pub type AtriumResult<T> = Result<T, AtriumError>;

// =============================================================================
// TESTS
// =============================================================================
