//! Text embedding client.
//!
//! `HttpEmbeddingClient` speaks the OpenAI-compatible `/v1/embeddings`
//! protocol (Mistral, OpenAI and most self-hosted servers). Transient
//! failures (network, 429, 5xx) are retried with exponential backoff;
//! other 4xx responses fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is not configured")]
    NotConfigured,
    #[error("cannot embed empty text")]
    EmptyInput,
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn model(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

pub struct HttpEmbeddingClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    max_retries: u32,
    client: Client,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            dimension: config.dimension,
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request_once(&self, body: &Value) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let api_key = self.api_key.as_deref().ok_or(EmbeddingError::NotConfigured)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        let vector = parse_embedding_response(&payload)?;

        if self.dimension > 0 && vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let body = json!({
            "model": self.model,
            "input": [text],
        });

        let mut attempt = 0;
        loop {
            match self.request_once(&body).await {
                Ok(vector) => return Ok(vector),
                Err(err) if is_transient(&err) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(250u64 << (attempt - 1).min(5));
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Embedding request failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_transient(err: &EmbeddingError) -> bool {
    match err {
        EmbeddingError::Request(_) => true,
        EmbeddingError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn parse_embedding_response(payload: &Value) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = payload
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|items| items.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing data[0].embedding".into()))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::InvalidResponse("non-numeric component".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_compatible_payload() {
        let payload = json!({
            "data": [{ "index": 0, "embedding": [0.5, -0.25, 1.0] }],
            "model": "mistral-embed"
        });
        assert_eq!(
            parse_embedding_response(&payload).unwrap(),
            vec![0.5, -0.25, 1.0]
        );
    }

    #[test]
    fn rejects_payload_without_embedding() {
        assert!(matches!(
            parse_embedding_response(&json!({ "data": [] })),
            Err(EmbeddingError::InvalidResponse(_))
        ));
        assert!(parse_embedding_response(&json!({ "data": [{ "embedding": ["x"] }] })).is_err());
    }

    #[test]
    fn only_network_429_and_5xx_are_transient() {
        assert!(is_transient(&EmbeddingError::Request("reset".into())));
        assert!(is_transient(&EmbeddingError::Api { status: 429, message: String::new() }));
        assert!(is_transient(&EmbeddingError::Api { status: 503, message: String::new() }));
        assert!(!is_transient(&EmbeddingError::Api { status: 401, message: String::new() }));
        assert!(!is_transient(&EmbeddingError::EmptyInput));
    }

    #[tokio::test]
    async fn unconfigured_client_fails_without_network() {
        let client = HttpEmbeddingClient::new(&EmbeddingConfig::default()).unwrap();
        assert!(!client.is_configured());
        assert!(matches!(
            client.embed("hello").await,
            Err(EmbeddingError::NotConfigured)
        ));
        assert!(matches!(client.embed("  ").await, Err(EmbeddingError::EmptyInput)));
    }
}
