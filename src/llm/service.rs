use std::time::{Duration, Instant};

use super::factory::ProviderFactory;
use super::retry::RetryPolicy;
use super::types::{GenerationConfig, GenerationError, LlmResponse};
use crate::core::config::LlmConfig;

/// Uniform entry point for text generation: resolves the provider for the
/// requested model, bounds every attempt with a timeout and retries
/// transient failures.
#[derive(Clone)]
pub struct LlmGateway {
    factory: ProviderFactory,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl LlmGateway {
    pub fn new(factory: ProviderFactory, retry: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            factory,
            retry,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            ProviderFactory::from_config(config),
            RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Generation settings for a request, falling back to configured defaults.
    pub fn default_config(config: &LlmConfig) -> GenerationConfig {
        GenerationConfig {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: Some(config.system_prompt.clone()).filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn providers(&self) -> Vec<String> {
        self.factory.provider_names()
    }

    pub async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<LlmResponse, GenerationError> {
        config
            .validate()
            .map_err(|e| GenerationError::InvalidRequest(e.to_string()))?;
        let provider = self.factory.resolve(&config.model)?;
        let timeout = self.attempt_timeout;
        let started = Instant::now();

        let mut response = self
            .retry
            .run(|attempt| {
                let provider = provider.clone();
                async move {
                    tracing::debug!(provider = provider.name(), attempt, "Calling LLM provider");
                    match tokio::time::timeout(timeout, provider.generate(prompt, config)).await {
                        Ok(result) => result,
                        Err(_) => Err(GenerationError::Timeout(timeout.as_millis() as u64)),
                    }
                }
            })
            .await
            .map_err(|err| {
                tracing::error!(
                    provider = provider.name(),
                    model = %config.model,
                    kind = err.kind(),
                    "Generation failed: {}",
                    err
                );
                err
            })?;

        response.latency_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            provider = provider.name(),
            model = %response.model,
            tokens_input = response.tokens_input,
            tokens_output = response.tokens_output,
            latency_ms = response.latency_ms,
            "Generation completed"
        );
        Ok(response)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{gateway_with, ScriptedProvider};
    use super::*;

    fn config() -> GenerationConfig {
        GenerationConfig::new("mistral-large-latest")
    }

    #[tokio::test]
    async fn returns_response_with_measured_latency() {
        let provider = ScriptedProvider::answering("Paris.");
        let gateway = gateway_with(provider.clone());

        let response = gateway.generate("capital?", &config()).await.unwrap();
        assert_eq!(response.text, "Paris.");
        assert_eq!(response.model, "mistral-large-latest");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let provider = ScriptedProvider::scripted(
            vec![
                Err(GenerationError::Transient("502".into())),
                Err(GenerationError::RateLimited("429".into())),
            ],
            Ok("ok".into()),
        );
        let gateway = gateway_with(provider.clone());

        assert_eq!(gateway.generate("q", &config()).await.unwrap().text, "ok");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn three_transient_failures_are_fatal() {
        let provider = ScriptedProvider::failing(GenerationError::Transient("503".into()));
        let gateway = gateway_with(provider.clone());

        let err = gateway.generate("q", &config()).await.unwrap_err();
        assert!(matches!(err, GenerationError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn auth_and_policy_errors_are_not_retried() {
        for err in [
            GenerationError::Auth("401".into()),
            GenerationError::ContentPolicy("blocked".into()),
            GenerationError::InvalidRequest("400".into()),
        ] {
            let provider = ScriptedProvider::failing(err);
            let gateway = gateway_with(provider.clone());
            assert!(gateway.generate("q", &config()).await.is_err());
            assert_eq!(provider.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn unknown_model_is_unsupported_and_bad_config_is_rejected() {
        let provider = ScriptedProvider::answering("x");
        let gateway = gateway_with(provider.clone());

        let err = gateway
            .generate("q", &GenerationConfig::new("gpt-4o"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnsupportedProvider(_)));

        let mut bad = config();
        bad.temperature = 3.0;
        let err = gateway.generate("q", &bad).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
        assert_eq!(provider.call_count(), 0);
    }
}
