use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::with_rate_headers;
use crate::core::errors::ApiError;
use crate::models::{ApiKey, ApiKeyCreate};
use crate::server::auth::{authorize_admin, AuthContext};
use crate::state::AppState;

const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListKeysParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default)]
    pub include_inactive: bool,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct KeyListResponse {
    pub keys: Vec<ApiKey>,
    pub page: usize,
    pub per_page: usize,
}

/// A new key together with its secret. The only response that ever
/// carries the raw key.
#[derive(Debug, Serialize)]
pub struct CreatedKeyResponse {
    #[serde(flatten)]
    pub key: ApiKey,
    #[serde(rename = "key")]
    pub raw_key: String,
}

fn respond(auth: Option<AuthContext>, body: impl IntoResponse) -> Response {
    match auth {
        Some(auth) => with_rate_headers(&auth, body),
        None => body.into_response(),
    }
}

pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListKeysParams>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize_admin(&state, &headers).await?;
    if params.page == 0 {
        return Err(ApiError::validation("page must be at least 1"));
    }
    if !(1..=MAX_PER_PAGE).contains(&params.per_page) {
        return Err(ApiError::validation(format!(
            "per_page must be between 1 and {}",
            MAX_PER_PAGE
        )));
    }

    let offset = (params.page - 1) * params.per_page;
    let keys = state
        .api_keys
        .list(params.per_page, offset, params.include_inactive)
        .await?;

    Ok(respond(
        auth,
        Json(KeyListResponse {
            keys,
            page: params.page,
            per_page: params.per_page,
        }),
    ))
}

pub async fn create_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ApiKeyCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize_admin(&state, &headers).await?;
    let (key, raw_key) = state.api_keys.create_key(&payload).await?;

    Ok(respond(
        auth,
        (
            StatusCode::CREATED,
            Json(CreatedKeyResponse { key, raw_key }),
        ),
    ))
}

pub async fn revoke_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize_admin(&state, &headers).await?;
    state.api_keys.revoke(&key_id).await?;
    Ok(respond(auth, StatusCode::NO_CONTENT))
}
