//! CRUD routes shared by every resource kind.
//!
//! Handlers are generic over the record type and mounted once per kind.

use atrium_core::{ListQuery, ResourceId};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;

use super::{bearer, etag_header, if_none_match, read_response};
use crate::access::StoreSelect;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET / - one page of records
pub async fn list_resources<R: StoreSelect>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let query = ListQuery::from_params(R::KIND, params)?;
    let outcome = state
        .access
        .list::<R>(bearer(&headers)?, &query, if_none_match(&headers))
        .await?;
    read_response(outcome)
}

/// GET /:id - one record
pub async fn get_resource<R: StoreSelect>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ResourceId>,
) -> ApiResult<Response> {
    let outcome = state
        .access
        .read::<R>(bearer(&headers)?, id, if_none_match(&headers))
        .await?;
    read_response(outcome)
}

/// POST / - create a record (admin only)
pub async fn create_resource<R>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<R::Draft>,
) -> ApiResult<Response>
where
    R: StoreSelect,
    R::Draft: DeserializeOwned,
{
    let written = state.access.create::<R>(bearer(&headers)?, draft).await?;
    let location = format!("/{}/{}", R::KIND.plural(), written.id);
    let location = HeaderValue::from_str(&location)
        .map_err(|_| ApiError::internal_error("Invalid Location header"))?;
    Ok((
        StatusCode::CREATED,
        [
            (header::ETAG, etag_header(&written.etag)?),
            (header::LOCATION, location),
        ],
        Json(written.body),
    )
        .into_response())
}

/// PUT /:id - partial update (owner or admin)
pub async fn update_resource<R>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ResourceId>,
    Json(patch): Json<R::Patch>,
) -> ApiResult<Response>
where
    R: StoreSelect,
    R::Patch: DeserializeOwned,
{
    let written = state.access.update::<R>(bearer(&headers)?, id, patch).await?;
    Ok((
        StatusCode::OK,
        [(header::ETAG, etag_header(&written.etag)?)],
        Json(written.body),
    )
        .into_response())
}

/// DELETE /:id - remove a record (owner or admin)
pub async fn delete_resource<R: StoreSelect>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ResourceId>,
) -> ApiResult<StatusCode> {
    state.access.delete::<R>(bearer(&headers)?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_router<R>() -> Router<AppState>
where
    R: StoreSelect,
    R::Draft: DeserializeOwned,
    R::Patch: DeserializeOwned,
{
    Router::new()
        .route("/", get(list_resources::<R>).post(create_resource::<R>))
        .route(
            "/:id",
            get(get_resource::<R>)
                .put(update_resource::<R>)
                .delete(delete_resource::<R>),
        )
}
