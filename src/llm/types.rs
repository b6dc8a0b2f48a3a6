use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

pub const MAX_TEMPERATURE: f32 = 2.0;
pub const MAX_OUTPUT_TOKENS: u32 = 8_192;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4_096,
            system_prompt: None,
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.model.trim().is_empty() {
            return Err(ApiError::validation("model must not be empty"));
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(ApiError::validation(format!(
                "temperature must be between 0.0 and {}",
                MAX_TEMPERATURE
            )));
        }
        if !(1..=MAX_OUTPUT_TOKENS).contains(&self.max_tokens) {
            return Err(ApiError::validation(format!(
                "max_tokens must be between 1 and {}",
                MAX_OUTPUT_TOKENS
            )));
        }
        Ok(())
    }

    /// System prompt (if any) followed by the user prompt.
    pub fn messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", prompt));
        messages
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("content rejected by provider policy: {0}")]
    ContentPolicy(String),
    #[error("provider rate limited the request: {0}")]
    RateLimited(String),
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("generation timed out after {0} ms")]
    Timeout(u64),
    #[error("no provider for model '{0}'")]
    UnsupportedProvider(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Network failures, timeouts, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited(_)
                | GenerationError::Transient(_)
                | GenerationError::Timeout(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            GenerationError::Timeout(_) => true,
            GenerationError::RetriesExhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::InvalidRequest(_) => "invalid_request",
            GenerationError::Auth(_) => "auth",
            GenerationError::ContentPolicy(_) => "content_policy",
            GenerationError::RateLimited(_) => "rate_limited",
            GenerationError::Transient(_) => "transient",
            GenerationError::Timeout(_) => "timeout",
            GenerationError::UnsupportedProvider(_) => "unsupported_provider",
            GenerationError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_enforces_ranges() {
        let mut config = GenerationConfig::new("mistral-large-latest");
        assert!(config.validate().is_ok());

        config.temperature = 2.1;
        assert!(config.validate().is_err());
        config.temperature = 0.0;
        config.max_tokens = 0;
        assert!(config.validate().is_err());
        config.max_tokens = 8_193;
        assert!(config.validate().is_err());
        config.max_tokens = 8_192;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn messages_include_system_prompt_when_present() {
        let mut config = GenerationConfig::new("m");
        assert_eq!(config.messages("hi").len(), 1);

        config.system_prompt = Some("be brief".into());
        let messages = config.messages("hi");
        assert_eq!(messages[0], ChatMessage::new("system", "be brief"));
        assert_eq!(messages[1], ChatMessage::new("user", "hi"));
    }

    #[test]
    fn retryable_classification() {
        assert!(GenerationError::Transient("502".into()).is_retryable());
        assert!(GenerationError::RateLimited("429".into()).is_retryable());
        assert!(GenerationError::Timeout(10).is_retryable());
        assert!(!GenerationError::Auth("401".into()).is_retryable());
        assert!(!GenerationError::ContentPolicy("blocked".into()).is_retryable());
        assert!(!GenerationError::InvalidRequest("bad".into()).is_retryable());

        let exhausted = GenerationError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GenerationError::Timeout(10)),
        };
        assert!(exhausted.is_timeout());
        assert!(!exhausted.is_retryable());
    }
}
