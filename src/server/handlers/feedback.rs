use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::with_rate_headers;
use crate::core::errors::ApiError;
use crate::models::{ApiKeyScope, FeedbackRequest};
use crate::server::auth::authorize;
use crate::state::AppState;

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize(&state, &headers, ApiKeyScope::Feedback).await?;
    let flag = state.feedback.submit(&payload).await?;

    Ok(with_rate_headers(
        &auth,
        (
            StatusCode::CREATED,
            Json(json!({
                "status": "success",
                "feedback": flag,
            })),
        ),
    ))
}
