use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

const API_NAME: &str = "RAG Agent API";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": API_NAME,
        "version": VERSION,
        "docs": "/health",
    }))
}

/// Liveness plus a per-service view. Degraded services do not fail the
/// probe; the API keeps answering with reduced retrieval.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.conversations.health_check().await {
        Ok(()) => "healthy",
        Err(err) => {
            tracing::warn!("Database health check failed: {}", err);
            "unhealthy"
        }
    };
    let llm = if state.gateway.providers().is_empty() {
        "not_configured"
    } else {
        "configured"
    };
    let web_search = match &state.services.web_search {
        Some(provider) => provider.as_str(),
        None => "disabled",
    };

    Json(json!({
        "status": "healthy",
        "version": VERSION,
        "services": {
            "database": database,
            "llm": llm,
            "llm_providers": state.gateway.providers(),
            "embedding": state.services.embedding_model,
            "web_search": web_search,
        }
    }))
}
