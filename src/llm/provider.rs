use async_trait::async_trait;

use super::types::{GenerationConfig, GenerationError, LlmResponse};

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider name used for routing (e.g. "mistral", "openai", "deepseek")
    fn name(&self) -> &str;

    /// whether this provider serves the given model name
    fn supports_model(&self, model: &str) -> bool;

    /// one completion attempt; retries are the gateway's job
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<LlmResponse, GenerationError>;
}
