use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use crate::core::errors::ApiError;
use crate::server::auth::authorize_admin;
use crate::state::AppState;

/// Effective configuration the server started with, secrets masked.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize_admin(&state, &headers).await?;
    let effective = serde_json::to_value(&state.settings).map_err(ApiError::internal)?;
    Ok(Json(state.config.redact_sensitive_values(&effective)))
}
