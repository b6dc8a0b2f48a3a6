use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::with_rate_headers;
use crate::core::errors::ApiError;
use crate::models::ApiKeyScope;
use crate::server::auth::authorize;
use crate::state::AppState;

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize(&state, &headers, ApiKeyScope::Query).await?;
    let conversation = state
        .conversations
        .get_by_id(&conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", conversation_id)))?;
    let feedback = state.conversations.get_feedback(&conversation.id).await?;

    Ok(with_rate_headers(
        &auth,
        Json(json!({
            "conversation": conversation,
            "feedback": feedback,
        })),
    ))
}
