use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::db;
use crate::embedding::{EmbeddingClient, HttpEmbeddingClient};
use crate::feedback::{FeedbackService, TrainingPipeline};
use crate::history::{ConversationStore, SqliteConversationStore};
use crate::ingest::IngestService;
use crate::keys::{ApiKeyService, ApiKeyStore};
use crate::llm::LlmGateway;
use crate::orchestrator::{assembler_config, OrchestratorSettings, QueryOrchestrator, RoutingClassifier};
use crate::rag::{ContextAssembler, SqliteVectorStore, VectorStore};
use crate::rate_limit::RateLimiter;
use crate::search::{HttpWebSearchClient, WebSearchClient};

pub mod error;

use error::InitializationError;

/// External services the state is wired with. Production builds them from
/// configuration; tests substitute in-process fakes.
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingClient>,
    pub web_search: Option<Arc<dyn WebSearchClient>>,
    pub gateway: LlmGateway,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig) -> Result<Self, InitializationError> {
        let embedder = HttpEmbeddingClient::new(&config.embedding)
            .map_err(|e| InitializationError::Embedding(e.into()))?;
        if !embedder.is_configured() {
            tracing::warn!("Embedding API key missing; vector retrieval will degrade");
        }

        let web_search: Option<Arc<dyn WebSearchClient>> = if config.search.enabled {
            let client = HttpWebSearchClient::from_config(&config.search)
                .map_err(|e| InitializationError::Search(e.into()))?;
            Some(Arc::new(client))
        } else {
            tracing::info!("Web search disabled by configuration");
            None
        };

        Ok(Self {
            embedder: Arc::new(embedder),
            web_search,
            gateway: LlmGateway::from_config(&config.llm),
        })
    }
}

/// Names reported by the health endpoint.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub embedding_model: String,
    pub web_search: Option<String>,
}

/// Application state shared across all routes and the training binary.
///
/// Every service is built once here and handed out as `Arc` handles.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    /// Effective configuration the services were built from.
    pub settings: AppConfig,
    pub services: ServiceInfo,
    pub conversations: Arc<dyn ConversationStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub api_keys: ApiKeyService,
    pub rate_limiter: RateLimiter,
    pub gateway: Arc<LlmGateway>,
    pub orchestrator: QueryOrchestrator,
    pub feedback: FeedbackService,
    pub training: TrainingPipeline,
    pub ingest: IngestService,
}

impl AppState {
    /// Initializes the application state:
    /// 1. Loading configuration from the data directory and environment
    /// 2. Building the embedding, web search and LLM clients
    /// 3. Opening the database and wiring every service
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_config()
            .map_err(|e| InitializationError::Config(e.into()))?;
        let collaborators = Collaborators::from_config(&settings)?;

        Self::assemble(paths, settings, collaborators).await
    }

    pub async fn assemble(
        paths: Arc<AppPaths>,
        settings: AppConfig,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let Collaborators {
            embedder,
            web_search,
            gateway,
        } = collaborators;

        let pool = db::connect(&paths.db_path)
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;
        let conversations: Arc<dyn ConversationStore> = Arc::new(
            SqliteConversationStore::with_pool(pool.clone())
                .await
                .map_err(|e| InitializationError::Database(e.into()))?,
        );
        let vector_store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::with_pool(pool.clone())
                .await
                .map_err(|e| InitializationError::Database(e.into()))?,
        );
        let api_keys = ApiKeyService::new(
            ApiKeyStore::with_pool(pool)
                .await
                .map_err(|e| InitializationError::Database(e.into()))?,
        )
        .with_default_rate_limit(settings.rate_limit.default_per_minute);

        let gateway = Arc::new(gateway);
        let router = RoutingClassifier::from_config(&settings.routing, gateway.clone());
        let orchestrator = QueryOrchestrator::new(
            router,
            embedder.clone(),
            vector_store.clone(),
            web_search.clone(),
            ContextAssembler::new(assembler_config(&settings)),
            gateway.clone(),
            conversations.clone(),
            OrchestratorSettings::from_config(&settings),
        );

        let services = ServiceInfo {
            embedding_model: embedder.model().to_string(),
            web_search: web_search.as_ref().map(|client| client.provider().to_string()),
        };

        tracing::info!(
            db = %paths.db_path.display(),
            providers = ?gateway.providers(),
            web_search = ?services.web_search,
            "Application state initialized"
        );

        Ok(Arc::new(AppState {
            config,
            services,
            feedback: FeedbackService::new(conversations.clone()),
            training: TrainingPipeline::new(
                conversations.clone(),
                embedder.clone(),
                vector_store.clone(),
            ),
            ingest: IngestService::new(
                embedder,
                vector_store.clone(),
                settings.ingest.max_chunk_chars,
            ),
            rate_limiter: RateLimiter::new(settings.rate_limit.prune_every),
            paths,
            settings,
            conversations,
            vector_store,
            api_keys,
            gateway,
            orchestrator,
        }))
    }
}
