pub mod factory;
pub mod openai_compat;
pub mod provider;
pub mod retry;
pub mod service;
pub mod types;

pub use factory::ProviderFactory;
pub use provider::LlmProvider;
pub use retry::RetryPolicy;
pub use service::LlmGateway;
pub use types::{ChatMessage, GenerationConfig, GenerationError, LlmResponse};
