//! Error Types for the Atrium API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use atrium_core::{AtriumError, StorageError, ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::AuthError;
use crate::view::AccessDenied;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthenticated,

    /// Authentication token has expired
    TokenExpired,

    /// Authentication token could not be decoded or failed its signature check
    MalformedToken,

    /// Authentication token was revoked before its expiry
    TokenRevoked,

    /// Request is authenticated but lacks permission for the resource
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found / Conflict (404, 409)
    // ========================================================================
    /// Requested resource does not exist
    NotFound,

    /// Write conflicts with existing state (e.g. duplicate username)
    Conflict,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// External store is unreachable or failed
    StoreUnavailable,

    /// A bounded operation did not finish in time
    Timeout,

    /// Cache invariant violated; never expected in correct operation
    CacheInconsistent,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthenticated
            | ErrorCode::TokenExpired
            | ErrorCode::MalformedToken
            | ErrorCode::TokenRevoked => StatusCode::UNAUTHORIZED,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::Conflict => StatusCode::CONFLICT,

            ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::CacheInconsistent | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "Authentication required",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::MalformedToken => "Authentication token is malformed",
            ErrorCode::TokenRevoked => "Authentication token has been revoked",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::Conflict => "Conflict with existing state",
            ErrorCode::StoreUnavailable => "Store unavailable",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::CacheInconsistent => "Cache inconsistency detected",
            ErrorCode::InternalError => "Internal server error",
        }
    }

    /// Whether a caller may retry the same request unchanged.
    ///
    /// Only reads should be retried; writes are never retried by this layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::StoreUnavailable | ErrorCode::Timeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, operation names, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedToken, message)
    }

    pub fn token_revoked() -> Self {
        Self::from_code(ErrorCode::TokenRevoked)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
        .with_details(serde_json::json!({ "field": field }))
    }

    /// Create a NotFound error for a specific resource.
    pub fn not_found(kind: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("{} with id {} not found", kind, id),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreUnavailable, message)
    }

    /// Create a Timeout error naming the operation that ran out of time.
    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
        .with_details(serde_json::json!({ "operation": operation }))
    }

    pub fn cache_inconsistent(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CacheInconsistent, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Lets handlers return `Result<_, ApiError>` directly.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<AtriumError> for ApiError {
    fn from(err: AtriumError) -> Self {
        match err {
            AtriumError::Storage(e) => e.into(),
            AtriumError::Validation(e) => e.into(),
            AtriumError::Cache(e) => {
                tracing::error!(error = %e, "cache error reached the API boundary");
                ApiError::cache_inconsistent("Cache inconsistency detected")
            }
            AtriumError::Config(e) => ApiError::internal_error(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => ApiError::not_found(kind, id),
            StorageError::Conflict { reason, .. } => ApiError::conflict(reason),
            StorageError::Timeout { operation, .. } => ApiError::timeout(&operation),
            StorageError::InsertFailed { kind, reason } => {
                tracing::error!(%kind, %reason, "store insert failed");
                ApiError::store_unavailable(format!("Insert of {} failed", kind))
            }
            StorageError::Unavailable { reason } => {
                tracing::error!(%reason, "store unavailable");
                ApiError::store_unavailable("Store operation failed")
            }
            StorageError::LockPoisoned => {
                tracing::error!("store lock poisoned");
                ApiError::store_unavailable("Store operation failed")
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(&field),
            other => ApiError::invalid_input(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => ApiError::token_expired(),
            AuthError::Malformed(reason) => ApiError::malformed_token(reason),
            AuthError::Revoked => ApiError::token_revoked(),
            AuthError::Unavailable(reason) => ApiError::store_unavailable(reason),
            AuthError::InvalidCredentials => {
                ApiError::unauthenticated("Invalid username or password")
            }
        }
    }
}

impl From<AccessDenied> for ApiError {
    fn from(err: AccessDenied) -> Self {
        match err {
            AccessDenied::Unauthenticated => ApiError::from_code(ErrorCode::Unauthenticated),
            AccessDenied::Forbidden(reason) => ApiError::forbidden(reason),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::{CacheError, ResourceKind};
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::TokenRevoked.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::StoreUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorCode::CacheInconsistent.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_only_store_failures_are_retryable() {
        assert!(ApiError::timeout("update").is_retryable());
        assert!(ApiError::store_unavailable("down").is_retryable());
        assert!(!ApiError::forbidden("nope").is_retryable());
        assert!(!ApiError::token_expired().is_retryable());
        assert!(!ApiError::cache_inconsistent("x").is_retryable());
    }

    #[test]
    fn test_storage_conversions() {
        let err: ApiError = AtriumError::from(StorageError::NotFound {
            kind: ResourceKind::Address,
            id: Uuid::nil(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.message.contains("address"));

        let err: ApiError = AtriumError::from(StorageError::Timeout {
            operation: "read".to_string(),
            elapsed: Duration::from_millis(10),
        })
        .into();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(err.details, Some(serde_json::json!({ "operation": "read" })));
    }

    #[test]
    fn test_cache_errors_do_not_leak_details() {
        let err: ApiError = AtriumError::from(CacheError::Inconsistent {
            reason: "journal lock poisoned".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::CacheInconsistent);
        assert!(!err.message.contains("journal"));
    }

    #[test]
    fn test_missing_field_carries_details() {
        let err: ApiError = ValidationError::RequiredFieldMissing {
            field: "email".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert_eq!(err.details, Some(serde_json::json!({ "field": "email" })));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::unauthenticated("Invalid token");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("UNAUTHENTICATED"));
        assert!(json.contains("Invalid token"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::store_unavailable("Connection failed");
        let display = format!("{}", err);

        assert!(display.contains("StoreUnavailable"));
        assert!(display.contains("Connection failed"));
    }
}
