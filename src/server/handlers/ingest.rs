use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use super::with_rate_headers;
use crate::core::errors::ApiError;
use crate::ingest::IngestTextRequest;
use crate::models::ApiKeyScope;
use crate::server::auth::authorize;
use crate::state::AppState;

pub async fn ingest_text(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IngestTextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize(&state, &headers, ApiKeyScope::Ingest).await?;
    let response = state.ingest.ingest_text(&payload).await?;
    Ok(with_rate_headers(&auth, Json(response)))
}
