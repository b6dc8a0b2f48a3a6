use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::{GenerationConfig, GenerationError, LlmResponse};
use crate::core::config::ProviderConfig;
use crate::rag::estimate_tokens;

const MISTRAL_MODEL_PREFIXES: [&str; 6] = [
    "mistral-",
    "open-mistral",
    "open-mixtral",
    "codestral",
    "pixtral",
    "ministral",
];
const OPENAI_MODEL_PREFIXES: [&str; 5] = ["gpt-", "o1", "o3", "o4", "chatgpt-"];
const DEEPSEEK_MODEL_PREFIXES: [&str; 1] = ["deepseek-"];

const POLICY_MARKERS: [&str; 4] = ["content_policy", "content_filter", "safety", "moderation"];

/// Chat-completions client shared by every hosted provider; they differ
/// only in base URL, credentials and the model families they serve.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    name: &'static str,
    base_url: String,
    api_key: String,
    model_prefixes: &'static [&'static str],
    client: Client,
}

impl OpenAiCompatibleProvider {
    fn new(
        name: &'static str,
        config: &ProviderConfig,
        model_prefixes: &'static [&'static str],
        timeout: Duration,
    ) -> Option<Self> {
        let api_key = config.api_key.as_deref()?.trim();
        if api_key.is_empty() {
            return None;
        }
        let client = Client::builder().timeout(timeout).build().ok()?;
        Some(Self {
            name,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_prefixes,
            client,
        })
    }

    /// `None` when no API key is configured.
    pub fn mistral(config: &ProviderConfig, timeout: Duration) -> Option<Self> {
        Self::new("mistral", config, &MISTRAL_MODEL_PREFIXES, timeout)
    }

    pub fn openai(config: &ProviderConfig, timeout: Duration) -> Option<Self> {
        Self::new("openai", config, &OPENAI_MODEL_PREFIXES, timeout)
    }

    pub fn deepseek(config: &ProviderConfig, timeout: Duration) -> Option<Self> {
        Self::new("deepseek", config, &DEEPSEEK_MODEL_PREFIXES, timeout)
    }
}

/// Provider family that owns a model name, if any.
pub fn provider_for_model(model: &str) -> Option<&'static str> {
    let model = model.trim().to_lowercase();
    [
        ("mistral", &MISTRAL_MODEL_PREFIXES[..]),
        ("openai", &OPENAI_MODEL_PREFIXES[..]),
        ("deepseek", &DEEPSEEK_MODEL_PREFIXES[..]),
    ]
    .into_iter()
    .find(|(_, prefixes)| prefixes.iter().any(|p| model.starts_with(p)))
    .map(|(name, _)| name)
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_model(&self, model: &str) -> bool {
        let model = model.trim().to_lowercase();
        self.model_prefixes.iter().any(|p| model.starts_with(p))
    }

    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<LlmResponse, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": config.model,
            "messages": config.messages(prompt),
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
            "stream": false,
        });

        let started = Instant::now();
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, started))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(classify_status(self.name, status, &text));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| GenerationError::Transient(format!("{} response unreadable: {}", self.name, e)))?;

        parse_completion(&payload, prompt, config, started.elapsed().as_millis() as u64)
    }
}

fn classify_transport_error(err: reqwest::Error, started: Instant) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(started.elapsed().as_millis() as u64)
    } else {
        GenerationError::Transient(err.to_string())
    }
}

fn classify_status(provider: &str, status: StatusCode, body: &str) -> GenerationError {
    let message = format!("{} returned {}: {}", provider, status, truncate(body, 300));
    match status.as_u16() {
        401 | 403 => GenerationError::Auth(message),
        429 => GenerationError::RateLimited(message),
        400 | 422 if is_policy_rejection(body) => GenerationError::ContentPolicy(message),
        s if s >= 500 => GenerationError::Transient(message),
        408 => GenerationError::Timeout(0),
        _ => GenerationError::InvalidRequest(message),
    }
}

fn is_policy_rejection(body: &str) -> bool {
    let lowered = body.to_lowercase();
    POLICY_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn parse_completion(
    payload: &Value,
    prompt: &str,
    config: &GenerationConfig,
    latency_ms: u64,
) -> Result<LlmResponse, GenerationError> {
    let choice = &payload["choices"][0];
    if choice["finish_reason"].as_str() == Some("content_filter") {
        return Err(GenerationError::ContentPolicy(
            "completion stopped by content filter".to_string(),
        ));
    }

    let text = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| GenerationError::Transient("completion has no message content".to_string()))?
        .to_string();

    let usage = &payload["usage"];
    let tokens_input = usage["prompt_tokens"]
        .as_u64()
        .map(|v| v as u32)
        .unwrap_or_else(|| {
            let system = config.system_prompt.as_deref().unwrap_or("");
            (estimate_tokens(prompt) + estimate_tokens(system)) as u32
        });
    let tokens_output = usage["completion_tokens"]
        .as_u64()
        .map(|v| v as u32)
        .unwrap_or_else(|| estimate_tokens(&text) as u32);

    Ok(LlmResponse {
        text,
        model: payload["model"]
            .as_str()
            .unwrap_or(&config.model)
            .to_string(),
        tokens_input,
        tokens_output,
        latency_ms,
    })
}
