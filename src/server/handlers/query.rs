use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use super::with_rate_headers;
use crate::core::errors::ApiError;
use crate::models::ApiKeyScope;
use crate::orchestrator::QueryRequest;
use crate::server::auth::authorize;
use crate::state::AppState;

pub async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize(&state, &headers, ApiKeyScope::Query).await?;
    let response = state.orchestrator.handle_query(payload, &auth.key.id).await?;
    Ok(with_rate_headers(&auth, Json(response)))
}
