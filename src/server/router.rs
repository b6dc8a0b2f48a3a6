use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::security::{API_KEY_HEADER, MASTER_KEY_HEADER};
use crate::server::handlers::{
    analytics, config, conversations, feedback, health, ingest, keys, query,
};
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// Every `/api/v1` handler authorizes its own request, so the scope
/// required by a route is visible next to the code that serves it.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_allowed_origins);
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/api/v1/query", post(query::query))
        .route(
            "/api/v1/conversations/:conversation_id",
            get(conversations::get_conversation),
        )
        .route("/api/v1/feedback", post(feedback::submit_feedback))
        .route("/api/v1/ingest/text", post(ingest::ingest_text))
        .route("/api/v1/analytics", get(analytics::get_analytics))
        .route(
            "/api/v1/keys",
            get(keys::list_keys).post(keys::create_key),
        )
        .route("/api/v1/keys/:key_id", delete(keys::revoke_key))
        .route("/api/v1/config", get(config::get_config))
        .with_state(state)
        .layer(middleware::from_fn(response_time))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

/// Stamps `X-Response-Time` (seconds, millisecond precision).
async fn response_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = format!("{:.3}s", started.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert("x-response-time", value);
    }
    response
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let origins = resolve_allowed_origins(configured)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(API_KEY_HEADER),
            header::HeaderName::from_static(MASTER_KEY_HEADER),
        ])
        .expose_headers([
            header::HeaderName::from_static("x-ratelimit-limit"),
            header::HeaderName::from_static("x-ratelimit-remaining"),
            header::HeaderName::from_static("x-ratelimit-reset"),
            header::HeaderName::from_static("x-response-time"),
        ])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins = configured
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }
    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8501".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:8501".to_string(),
    ]
}
