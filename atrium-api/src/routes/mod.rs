//! REST API Routes Module
//!
//! - `POST /auth/token`: credential exchange
//! - `/users`, `/addresses` (and `/:id`): CRUD through the access coordinator
//! - `/health/*`: liveness and cache statistics, no authentication
//!
//! Reads answer with an `ETag` header and honor `If-None-Match`.

pub mod auth;
pub mod health;
pub mod resources;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::access::ReadOutcome;
use crate::auth::extract_bearer;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Full router with tracing.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::create_router())
        .nest("/users", resources::create_router::<atrium_core::User>())
        .nest("/addresses", resources::create_router::<atrium_core::Address>())
        .nest("/health", health::create_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bearer token from the `Authorization` header, if any.
pub(crate) fn bearer(headers: &HeaderMap) -> ApiResult<Option<&str>> {
    let value = headers
        .get(header::AUTHORIZATION)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::malformed_token("Authorization header is not valid text"))
        })
        .transpose()?;
    Ok(extract_bearer(value)?)
}

pub(crate) fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
}

pub(crate) fn etag_header(etag: &atrium_storage::ETag) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&etag.header_value())
        .map_err(|e| ApiError::internal_error(format!("Invalid ETag header: {}", e)))
}

/// 200 with body and tag, or 304 with the tag only.
pub(crate) fn read_response(outcome: ReadOutcome) -> ApiResult<Response> {
    let etag = etag_header(outcome.etag())?;
    let response = match outcome {
        ReadOutcome::Full { body, .. } => {
            (StatusCode::OK, [(header::ETAG, etag)], Json(body)).into_response()
        }
        ReadOutcome::NotModified { .. } => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            response.headers_mut().insert(header::ETAG, etag);
            response
        }
    };
    Ok(response)
}
