pub mod analytics;
pub mod config;
pub mod conversations;
pub mod feedback;
pub mod health;
pub mod ingest;
pub mod keys;
pub mod query;

use axum::response::{IntoResponse, Response};

use crate::server::auth::{apply_rate_headers, AuthContext};

/// Renders `body` with the caller's `X-RateLimit-*` headers attached.
pub(crate) fn with_rate_headers(auth: &AuthContext, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    apply_rate_headers(&mut response, &auth.rate);
    response
}
