use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use super::with_rate_headers;
use crate::core::errors::ApiError;
use crate::models::ApiKeyScope;
use crate::server::auth::authorize;
use crate::state::AppState;

const MAX_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    7
}

pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AnalyticsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = authorize(&state, &headers, ApiKeyScope::Admin).await?;
    if !(1..=MAX_DAYS).contains(&params.days) {
        return Err(ApiError::validation(format!(
            "days must be between 1 and {}",
            MAX_DAYS
        )));
    }

    let summary = state.conversations.analytics(params.days).await?;
    Ok(with_rate_headers(&auth, Json(summary)))
}
