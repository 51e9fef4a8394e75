//! Credential exchange endpoint.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::IssuedToken;
use crate::error::ApiResult;
use crate::state::AppState;

/// Body of `POST /auth/token`.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// POST /auth/token - exchange credentials for a bearer token
pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Json<IssuedToken>> {
    let issued = state.access.login(&req.username, &req.password).await?;
    Ok(Json(issued))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/token", post(issue_token))
}
