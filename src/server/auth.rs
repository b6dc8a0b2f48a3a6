//! Request authorization: API key resolution, scope check and rate limiting.

use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;

use crate::core::errors::ApiError;
use crate::core::security::{extract_api_key, has_master_key};
use crate::models::{ApiKey, ApiKeyScope};
use crate::rate_limit::RateLimitDecision;
use crate::state::AppState;

/// The caller behind an authorized request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub key: ApiKey,
    pub rate: RateLimitDecision,
}

/// Resolves the `x-api-key` header to an active key holding `scope`, then
/// charges one request against the key's per-minute window. Usage counters
/// only move once both checks pass.
pub async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    scope: ApiKeyScope,
) -> Result<AuthContext, ApiError> {
    let raw = extract_api_key(headers)?;
    let key = state.api_keys.resolve(raw).await?;

    if !key.has_scope(scope) {
        tracing::warn!(key_id = %key.id, scope = %scope, "Insufficient scope");
        return Err(ApiError::InsufficientScope(scope.to_string()));
    }

    let rate = state
        .rate_limiter
        .check_and_increment(&key.id, key.rate_limit_per_minute);
    if !rate.allowed {
        tracing::warn!(
            key_id = %key.id,
            count = rate.current_count,
            limit = rate.limit,
            "Rate limit exceeded"
        );
        return Err(ApiError::RateLimited {
            limit: rate.limit,
            reset_seconds: rate.reset_seconds,
        });
    }

    let key = state.api_keys.record_usage(key).await?;
    Ok(AuthContext { key, rate })
}

/// Key management accepts the configured master key or an `admin` key.
/// Returns the admin context when a key was used.
pub async fn authorize_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthContext>, ApiError> {
    if has_master_key(headers, state.settings.security.master_key.as_deref()) {
        tracing::debug!("Request authorized with master key");
        return Ok(None);
    }
    authorize(state, headers, ApiKeyScope::Admin).await.map(Some)
}

pub fn apply_rate_headers(response: &mut Response, rate: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(rate.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(rate.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(rate.reset_seconds));
}
