//! Atrium API - Cached Authorization & Access Layer
//!
//! Issues and verifies bearer tokens, resolves which projection of a record
//! a caller may see, and serves reads through a version-fenced cache that
//! writes invalidate. A thin Axum router sits on top.

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod view;

// Re-export commonly used types
pub use access::{AccessCoordinator, ReadOutcome, StoreSelect, Stores, Written};
pub use auth::{
    check_credentials, extract_bearer, AuthConfig, AuthError, Claims, DigestPasswordVerifier,
    InMemoryRevocationList, IssuedToken, JwtSecret, PasswordVerifier, RevocationList,
    TokenService, TokenVerdict,
};
pub use config::{AdminBootstrap, ServiceConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use state::{in_memory_state, AppState};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use view::{authorize_create, authorize_mutation, resolve, resolve_for, resolve_list, AccessDenied};
