use std::sync::Arc;
use std::time::Duration;

use super::openai_compat::OpenAiCompatibleProvider;
use super::provider::LlmProvider;
use super::types::GenerationError;
use crate::core::config::LlmConfig;

/// Resolves a model name to the provider that serves it.
#[derive(Clone, Default)]
pub struct ProviderFactory {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl ProviderFactory {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Registers every hosted provider that has credentials.
    pub fn from_config(config: &LlmConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let providers = &config.providers;
        let candidates = [
            OpenAiCompatibleProvider::mistral(&providers.mistral, timeout),
            OpenAiCompatibleProvider::openai(&providers.openai, timeout),
            OpenAiCompatibleProvider::deepseek(&providers.deepseek, timeout),
        ];

        let providers: Vec<Arc<dyn LlmProvider>> = candidates
            .into_iter()
            .flatten()
            .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
            .collect();

        if providers.is_empty() {
            tracing::warn!("No LLM provider has an API key; generation will fail");
        }
        Self { providers }
    }

    pub fn resolve(&self, model: &str) -> Result<Arc<dyn LlmProvider>, GenerationError> {
        self.providers
            .iter()
            .find(|provider| provider.supports_model(model))
            .cloned()
            .ok_or_else(|| GenerationError::UnsupportedProvider(model.to_string()))
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }
}
