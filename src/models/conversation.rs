use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSourceType {
    VectorStore,
    Web,
}

/// One chunk that went into the prompt, in the order it was ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    pub source_type: ContextSourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub content_preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationMetadata {
    pub model_used: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub response_time_ms: u64,
    pub web_search_used: bool,
    pub vector_failed: bool,
    pub web_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_intent: Option<String>,
    /// Set on failure-audit records, where `ai_response` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub user_query: String,
    pub ai_response: String,
    pub context_sources: Vec<ContextSource>,
    pub metadata: ConversationMetadata,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>, user_query: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            user_query: user_query.into(),
            ai_response: String::new(),
            context_sources: Vec::new(),
            metadata: ConversationMetadata::default(),
            created_at: Utc::now(),
        }
    }

    pub fn is_failure_audit(&self) -> bool {
        self.metadata.generation_error.is_some()
    }
}
