#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use rag_agent_backend::core::config::{AppConfig, AppPaths};
use rag_agent_backend::embedding::{EmbeddingClient, EmbeddingError};
use rag_agent_backend::llm::{
    GenerationConfig, GenerationError, LlmGateway, LlmProvider, LlmResponse, ProviderFactory,
    RetryPolicy,
};
use rag_agent_backend::models::{ApiKeyCreate, ApiKeyScope};
use rag_agent_backend::server::router::router;
use rag_agent_backend::state::{AppState, Collaborators};

pub const MASTER_KEY: &str = "test-master-key";
pub const ANSWER: &str = "Paris is the capital of France.";

pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingClient for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed-embed"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(vec![0.6, 0.8])
    }
}

/// Answers every prompt with [`ANSWER`] and records how often it was called.
#[derive(Default)]
pub struct CannedProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for CannedProvider {
    fn name(&self) -> &str {
        "canned"
    }

    fn supports_model(&self, _model: &str) -> bool {
        true
    }

    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<LlmResponse, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse {
            text: ANSWER.to_string(),
            model: config.model.clone(),
            tokens_input: (prompt.len() / 4) as u32,
            tokens_output: 8,
            latency_ms: 1,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub provider: Arc<CannedProvider>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::with_data_dir(dir.path()));

        let mut settings = AppConfig::default();
        settings.security.master_key = Some(MASTER_KEY.to_string());
        settings.search.enabled = false;

        let provider = Arc::new(CannedProvider::default());
        let gateway = LlmGateway::new(
            ProviderFactory::new(vec![provider.clone() as Arc<dyn LlmProvider>]),
            RetryPolicy {
                base_delay: Duration::from_millis(1),
                jitter: 0.0,
                ..RetryPolicy::default()
            },
            Duration::from_secs(5),
        );
        let collaborators = Collaborators {
            embedder: Arc::new(FixedEmbedder),
            web_search: None,
            gateway,
        };

        let state = AppState::assemble(paths, settings, collaborators)
            .await
            .unwrap();
        Self {
            router: router(state.clone()),
            state,
            provider,
            _dir: dir,
        }
    }

    /// Mints a key directly through the service and returns the raw secret.
    pub async fn key(&self, scopes: &[ApiKeyScope]) -> String {
        self.key_with_limit(scopes, None).await
    }

    pub async fn key_with_limit(&self, scopes: &[ApiKeyScope], limit: Option<u32>) -> String {
        let request = ApiKeyCreate {
            name: "integration test".to_string(),
            scopes: scopes.to_vec(),
            rate_limit_per_minute: limit,
            monthly_quota: None,
            expires_in_days: None,
            metadata: None,
        };
        let (_, raw) = self.state.api_keys.create_key(&request).await.unwrap();
        raw
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }
}

pub fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn with_master_key(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-master-key", MASTER_KEY)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
