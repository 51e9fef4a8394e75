//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check with uptime
//! - /health/cache - Cache statistics
//! - POST /health/cache/reset - Clear and re-enable the cache (admin only)
//!
//! The read endpoints need no authentication.

use atrium_storage::CacheStats;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::bearer;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

impl From<CacheStats> for CacheHealth {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/cache - hit/miss counters, entry count and whether the
/// cache is disabled
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheHealth> {
    Json(state.access.cache_stats().into())
}

/// POST /health/cache/reset - drop every entry and re-enable the cache
pub async fn reset_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CacheHealth>> {
    let stats = state.access.reset_cache(bearer(&headers)?).await?;
    Ok(Json(stats.into()))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/cache", get(cache_stats))
        .route("/cache/reset", post(reset_cache))
}
