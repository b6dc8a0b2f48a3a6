use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::llm::types::{MAX_OUTPUT_TOKENS, MAX_TEMPERATURE};
use crate::models::ContextSource;

pub const MAX_QUESTION_CHARS: usize = 5_000;
const MAX_SYSTEM_PROMPT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub use_web_search: Option<bool>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let len = self.question.trim().chars().count();
        if len == 0 {
            return Err(ApiError::validation("question must not be empty"));
        }
        if len > MAX_QUESTION_CHARS {
            return Err(ApiError::validation(format!(
                "question must be at most {} characters",
                MAX_QUESTION_CHARS
            )));
        }
        if let Some(prompt) = &self.system_prompt {
            if prompt.chars().count() > MAX_SYSTEM_PROMPT_CHARS {
                return Err(ApiError::validation(format!(
                    "system_prompt must be at most {} characters",
                    MAX_SYSTEM_PROMPT_CHARS
                )));
            }
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
                return Err(ApiError::validation(format!(
                    "temperature must be between 0.0 and {}",
                    MAX_TEMPERATURE
                )));
            }
        }
        if let Some(max_tokens) = self.max_tokens {
            if !(1..=MAX_OUTPUT_TOKENS).contains(&max_tokens) {
                return Err(ApiError::validation(format!(
                    "max_tokens must be between 1 and {}",
                    MAX_OUTPUT_TOKENS
                )));
            }
        }
        if let Some(session_id) = &self.session_id {
            if session_id.trim().is_empty() || session_id.len() > 128 {
                return Err(ApiError::validation(
                    "session_id must be between 1 and 128 characters",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub model_used: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub response_time_ms: u64,
    pub web_search_used: bool,
    pub routing_intent: String,
    pub routing_confidence: f32,
    pub vector_failed: bool,
    pub web_failed: bool,
    pub persist_failed: bool,
    pub context_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<ContextSource>,
    /// `None` when the conversation could not be persisted.
    pub conversation_id: Option<String>,
    pub session_id: String,
    pub metadata: QueryMetadata,
}

/// Lifecycle of one query, logged as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Routing,
    Retrieving,
    Assembling,
    Generating,
    Persisting,
    Done,
    Failed,
}

impl QueryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStage::Routing => "routing",
            QueryStage::Retrieving => "retrieving",
            QueryStage::Assembling => "assembling",
            QueryStage::Generating => "generating",
            QueryStage::Persisting => "persisting",
            QueryStage::Done => "done",
            QueryStage::Failed => "failed",
        }
    }
}
