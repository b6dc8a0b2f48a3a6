use axum::http::{HeaderValue, StatusCode};
use axum::{response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::llm::GenerationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("authentication required")]
    AuthenticationRequired,
    /// Key was presented but rejected. Carries the machine reason
    /// (`invalid_key`, `key_revoked`, `key_expired`).
    #[error("api key rejected: {0}")]
    InvalidApiKey(&'static str),
    #[error("insufficient scope: '{0}' required")]
    InsufficientScope(String),
    #[error("rate limit exceeded ({limit} requests per minute)")]
    RateLimited { limit: u32, reset_seconds: u64 },
    #[error("monthly quota exceeded")]
    QuotaExceeded,
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("generation timed out")]
    GenerationTimeout,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthenticationRequired | ApiError::InvalidApiKey(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } | ApiError::QuotaExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::GenerationTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code placed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::AuthenticationRequired => "authentication_required",
            ApiError::InvalidApiKey(reason) => *reason,
            ApiError::InsufficientScope(_) => "insufficient_scope",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::QuotaExceeded => "quota_exceeded",
            ApiError::GenerationFailed(_) => "generation_failed",
            ApiError::GenerationTimeout => "generation_timeout",
            ApiError::ServiceUnavailable => "service_unavailable",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        if err.is_timeout() {
            ApiError::GenerationTimeout
        } else {
            ApiError::GenerationFailed(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            // Internal details stay in the logs.
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));
        let mut response = (status, body).into_response();

        if let ApiError::RateLimited {
            limit,
            reset_seconds,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_seconds));
            headers.insert("retry-after", HeaderValue::from(reset_seconds));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_code_follow_taxonomy() {
        assert_eq!(
            ApiError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidApiKey("key_expired").code(),
            "key_expired"
        );
        assert_eq!(
            ApiError::InsufficientScope("ingest".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::QuotaExceeded.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::GenerationTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn generation_timeout_maps_to_gateway_timeout() {
        let err: ApiError = GenerationError::Timeout(1000).into();
        assert!(matches!(err, ApiError::GenerationTimeout));

        let err: ApiError = GenerationError::Auth("nope".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn rate_limited_response_carries_headers() {
        let response = ApiError::RateLimited {
            limit: 10,
            reset_seconds: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()["retry-after"], "42");
    }
}
