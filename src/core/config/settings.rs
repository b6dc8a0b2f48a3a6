//! Typed view of the effective configuration.
//!
//! Every section is `#[serde(default)]`, so a partial YAML file only
//! overrides what it names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub routing: RoutingConfig,
    pub search: SearchConfig,
    pub rate_limit: RateLimitConfig,
    pub training: TrainingConfig,
    pub ingest: IngestConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub system_prompt: String,
    pub providers: ProvidersConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "mistral-large-latest".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 60,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            system_prompt: "You are a helpful assistant. Answer using the provided context when \
                it is relevant, cite sources by their bracketed number, and say so plainly when \
                the context does not contain the answer. Reply in the language of the question."
                .to_string(),
            providers: ProvidersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub mistral: ProviderConfig,
    pub openai: ProviderConfig,
    pub deepseek: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            mistral: ProviderConfig::with_base_url("https://api.mistral.ai"),
            openai: ProviderConfig::with_base_url("https://api.openai.com"),
            deepseek: ProviderConfig::with_base_url("https://api.deepseek.com"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderConfig {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "mistral-embed".to_string(),
            dimension: 1024,
            base_url: "https://api.mistral.ai".to_string(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub context_token_budget: usize,
    pub vector_timeout_ms: u64,
    pub web_timeout_ms: u64,
    pub dedup_threshold: f32,
    pub web_base_relevance: f32,
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity_threshold: 0.7,
            context_token_budget: 3000,
            vector_timeout_ms: 5_000,
            web_timeout_ms: 8_000,
            dedup_threshold: 0.95,
            web_base_relevance: 0.75,
            history_turns: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Ask a model to label the intent before applying the heuristics.
    pub llm_intent: bool,
    pub intent_model: String,
    pub intent_timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            llm_intent: false,
            intent_model: "mistral-small-latest".to_string(),
            intent_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    /// `brave`, `google` or `duckduckgo`.
    pub provider: String,
    pub brave_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub google_engine_id: Option<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "duckduckgo".to_string(),
            brave_api_key: None,
            google_api_key: None,
            google_engine_id: None,
            max_results: 5,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default_per_minute: u32,
    pub prune_every: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_per_minute: 100,
            prune_every: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_limit: usize,
    pub interval_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            interval_secs: 300,
            error_backoff_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_chunk_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bootstrap secret for key management (`x-master-key`).
    pub master_key: Option<String>,
}
