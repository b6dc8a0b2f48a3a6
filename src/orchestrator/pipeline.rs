//! The query pipeline:
//! routing -> retrieving -> assembling -> generating -> persisting -> done.
//!
//! Retrieval legs degrade to empty sets, persistence degrades to a missing
//! conversation id; only generation failures are fatal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::routing::RoutingClassifier;
use super::types::{QueryMetadata, QueryRequest, QueryResponse, QueryStage};
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::embedding::EmbeddingClient;
use crate::history::ConversationStore;
use crate::llm::{GenerationConfig, LlmGateway};
use crate::models::{Conversation, ConversationMetadata, DocumentMatch, RoutingDecision};
use crate::rag::{AssemblerConfig, ContextAssembler, PromptContext, VectorStore};
use crate::search::{WebResult, WebSearchClient};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub top_k: usize,
    pub min_similarity: f32,
    pub token_budget: usize,
    pub vector_timeout: Duration,
    pub web_timeout: Duration,
    pub history_turns: usize,
    pub generation: GenerationConfig,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let retrieval = &config.retrieval;
        Self {
            top_k: retrieval.top_k,
            min_similarity: retrieval.similarity_threshold,
            token_budget: retrieval.context_token_budget,
            vector_timeout: Duration::from_millis(retrieval.vector_timeout_ms),
            web_timeout: Duration::from_millis(retrieval.web_timeout_ms),
            history_turns: retrieval.history_turns,
            generation: LlmGateway::default_config(&config.llm),
        }
    }
}

pub fn assembler_config(config: &AppConfig) -> AssemblerConfig {
    AssemblerConfig {
        dedup_threshold: config.retrieval.dedup_threshold,
        web_base_relevance: config.retrieval.web_base_relevance,
        ..AssemblerConfig::default()
    }
}

/// Outcome of one retrieval leg. A failed leg carries no items.
struct Leg<T> {
    items: Vec<T>,
    failed: bool,
}

impl<T> Leg<T> {
    fn skipped() -> Self {
        Self {
            items: Vec::new(),
            failed: false,
        }
    }

    fn failed() -> Self {
        Self {
            items: Vec::new(),
            failed: true,
        }
    }
}

pub struct QueryOrchestrator {
    router: RoutingClassifier,
    embedder: Arc<dyn EmbeddingClient>,
    vector_store: Arc<dyn VectorStore>,
    web_search: Option<Arc<dyn WebSearchClient>>,
    assembler: ContextAssembler,
    gateway: Arc<LlmGateway>,
    conversations: Arc<dyn ConversationStore>,
    settings: OrchestratorSettings,
}

impl QueryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: RoutingClassifier,
        embedder: Arc<dyn EmbeddingClient>,
        vector_store: Arc<dyn VectorStore>,
        web_search: Option<Arc<dyn WebSearchClient>>,
        assembler: ContextAssembler,
        gateway: Arc<LlmGateway>,
        conversations: Arc<dyn ConversationStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            router,
            embedder,
            vector_store,
            web_search,
            assembler,
            gateway,
            conversations,
            settings,
        }
    }

    pub async fn handle_query(
        &self,
        request: QueryRequest,
        key_id: &str,
    ) -> Result<QueryResponse, ApiError> {
        request.validate()?;
        let started = Instant::now();
        let question = request.question.trim();
        let supplied_session = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let session_id = supplied_session
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.enter(QueryStage::Routing, key_id, &session_id);
        let history = match supplied_session {
            Some(session) => self.load_history(session, key_id).await,
            None => Vec::new(),
        };
        let decision = self
            .router
            .classify(question, &history, request.use_web_search)
            .await;
        tracing::debug!(
            intent = decision.intent.as_str(),
            use_vector = decision.use_vector,
            use_web = decision.use_web,
            confidence = decision.confidence,
            "Routing decided"
        );

        self.enter(QueryStage::Retrieving, key_id, &session_id);
        let (vector, web) = tokio::join!(
            self.vector_leg(question, &decision, key_id, &session_id),
            self.web_leg(question, &decision, key_id, &session_id)
        );

        self.enter(QueryStage::Assembling, key_id, &session_id);
        let context = self.assembler.assemble(
            &decision,
            question,
            &vector.items,
            &web.items,
            self.settings.token_budget,
        );
        let sources = context.sources(self.assembler.config().preview_chars);
        let prompt = build_prompt(question, &history, &context);

        let mut generation = self.settings.generation.clone();
        if let Some(temperature) = request.temperature {
            generation.temperature = temperature;
        }
        if let Some(max_tokens) = request.max_tokens {
            generation.max_tokens = max_tokens;
        }
        if let Some(system_prompt) = request
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            generation.system_prompt = Some(system_prompt.to_string());
        }

        let mut conversation = Conversation::new(session_id.clone(), question);
        conversation.context_sources = sources.clone();
        conversation.metadata = ConversationMetadata {
            model_used: generation.model.clone(),
            web_search_used: !web.items.is_empty(),
            vector_failed: vector.failed,
            web_failed: web.failed,
            routing_intent: Some(decision.intent.as_str().to_string()),
            ..ConversationMetadata::default()
        };

        self.enter(QueryStage::Generating, key_id, &session_id);
        let response = match self.gateway.generate(&prompt, &generation).await {
            Ok(response) => response,
            Err(err) => {
                self.enter(QueryStage::Failed, key_id, &session_id);
                tracing::error!(
                    key_id = %key_id,
                    session_id = %session_id,
                    kind = err.kind(),
                    "Generation failed: {}",
                    err
                );
                conversation.metadata.generation_error = Some(err.to_string());
                conversation.metadata.response_time_ms = started.elapsed().as_millis() as u64;
                if let Err(audit_err) = self.conversations.create(&conversation).await {
                    tracing::warn!(
                        key_id = %key_id,
                        session_id = %session_id,
                        "Failed to record failure audit: {}",
                        audit_err
                    );
                }
                return Err(err.into());
            }
        };

        conversation.ai_response = response.text.clone();
        conversation.metadata.model_used = response.model.clone();
        conversation.metadata.tokens_input = response.tokens_input;
        conversation.metadata.tokens_output = response.tokens_output;
        conversation.metadata.response_time_ms = started.elapsed().as_millis() as u64;

        self.enter(QueryStage::Persisting, key_id, &session_id);
        let conversation_id = match self.conversations.create(&conversation).await {
            Ok(()) => Some(conversation.id.clone()),
            Err(err) => {
                tracing::warn!(
                    key_id = %key_id,
                    session_id = %session_id,
                    "Conversation not persisted, answering anyway: {}",
                    err
                );
                None
            }
        };

        let metadata = QueryMetadata {
            model_used: response.model,
            tokens_input: response.tokens_input,
            tokens_output: response.tokens_output,
            response_time_ms: started.elapsed().as_millis() as u64,
            web_search_used: conversation.metadata.web_search_used,
            routing_intent: decision.intent.as_str().to_string(),
            routing_confidence: decision.confidence,
            vector_failed: vector.failed,
            web_failed: web.failed,
            persist_failed: conversation_id.is_none(),
            context_tokens: context.token_estimate,
        };

        self.enter(QueryStage::Done, key_id, &session_id);
        tracing::info!(
            key_id = %key_id,
            session_id = %session_id,
            conversation_id = conversation_id.as_deref().unwrap_or("-"),
            sources = sources.len(),
            response_time_ms = metadata.response_time_ms,
            "Query answered"
        );

        Ok(QueryResponse {
            answer: response.text,
            sources,
            conversation_id,
            session_id,
            metadata,
        })
    }

    fn enter(&self, stage: QueryStage, key_id: &str, session_id: &str) {
        tracing::debug!(stage = stage.as_str(), key_id = %key_id, session_id = %session_id, "Query stage");
    }

    async fn load_history(&self, session_id: &str, key_id: &str) -> Vec<Conversation> {
        match self
            .conversations
            .list_recent_by_session(session_id, self.settings.history_turns)
            .await
        {
            Ok(turns) => turns,
            Err(err) => {
                tracing::warn!(
                    key_id = %key_id,
                    session_id = %session_id,
                    "Could not load session history: {}",
                    err
                );
                Vec::new()
            }
        }
    }

    async fn vector_leg(
        &self,
        question: &str,
        decision: &RoutingDecision,
        key_id: &str,
        session_id: &str,
    ) -> Leg<DocumentMatch> {
        if !decision.use_vector {
            return Leg::skipped();
        }

        let search = async {
            let embedding = self
                .embedder
                .embed(question)
                .await
                .map_err(|e| e.to_string())?;
            self.vector_store
                .search(&embedding, self.settings.top_k, self.settings.min_similarity)
                .await
                .map_err(|e| e.to_string())
        };

        match tokio::time::timeout(self.settings.vector_timeout, search).await {
            Ok(Ok(hits)) => Leg {
                items: hits,
                failed: false,
            },
            Ok(Err(message)) => {
                tracing::warn!(key_id = %key_id, session_id = %session_id, leg = "vector", "Retrieval leg failed: {}", message);
                Leg::failed()
            }
            Err(_) => {
                tracing::warn!(key_id = %key_id, session_id = %session_id, leg = "vector", "Retrieval leg timed out");
                Leg::failed()
            }
        }
    }

    async fn web_leg(
        &self,
        question: &str,
        decision: &RoutingDecision,
        key_id: &str,
        session_id: &str,
    ) -> Leg<WebResult> {
        if !decision.use_web {
            return Leg::skipped();
        }
        let Some(web_search) = &self.web_search else {
            tracing::debug!("Web search requested but disabled");
            return Leg::skipped();
        };

        match tokio::time::timeout(self.settings.web_timeout, web_search.search(question)).await {
            Ok(Ok(results)) => Leg {
                items: results,
                failed: false,
            },
            Ok(Err(err)) => {
                tracing::warn!(key_id = %key_id, session_id = %session_id, leg = "web", "Retrieval leg failed: {}", err);
                Leg::failed()
            }
            Err(_) => {
                tracing::warn!(key_id = %key_id, session_id = %session_id, leg = "web", "Retrieval leg timed out");
                Leg::failed()
            }
        }
    }
}

/// Recent turns, then the numbered context, then the question.
pub fn build_prompt(question: &str, history: &[Conversation], context: &PromptContext) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.user_query, turn.ai_response));
        }
        prompt.push('\n');
    }

    if context.is_empty() {
        prompt.push_str("No relevant context was found. Answer from general knowledge and say so.\n\n");
    } else {
        prompt.push_str("Context:\n");
        prompt.push_str(&context.render());
        prompt.push_str("\n\n");
    }

    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::service::testing::{gateway_with, ScriptedProvider};
    use crate::llm::GenerationError;
    use crate::models::{ContextSourceType, Document, SourceType};
    use crate::testing::{FakeEmbedder, FakeWebSearch, MemoryConversationStore, MemoryVectorStore};

    struct Harness {
        provider: Arc<ScriptedProvider>,
        conversations: Arc<MemoryConversationStore>,
        web: Arc<FakeWebSearch>,
        orchestrator: QueryOrchestrator,
    }

    fn harness(
        embedder: FakeEmbedder,
        store: MemoryVectorStore,
        web: FakeWebSearch,
        provider: Arc<ScriptedProvider>,
        conversations: MemoryConversationStore,
    ) -> Harness {
        let conversations = Arc::new(conversations);
        let web = Arc::new(web);
        let orchestrator = QueryOrchestrator::new(
            RoutingClassifier::heuristic(),
            Arc::new(embedder),
            Arc::new(store),
            Some(web.clone() as Arc<dyn WebSearchClient>),
            ContextAssembler::new(AssemblerConfig::default()),
            Arc::new(gateway_with(provider.clone())),
            conversations.clone(),
            OrchestratorSettings::from_config(&AppConfig::default()),
        );
        Harness {
            provider,
            conversations,
            web,
            orchestrator,
        }
    }

    fn france_hit() -> DocumentMatch {
        DocumentMatch {
            document: Document::new(
                "Paris is the capital and largest city of France.",
                SourceType::Manual,
                "geo-notes",
            )
            .with_embedding(vec![1.0, 0.0]),
            similarity: 0.9,
        }
    }

    #[tokio::test]
    async fn factual_question_uses_vector_hit_without_web() {
        let h = harness(
            FakeEmbedder::fixed(vec![1.0, 0.0]),
            MemoryVectorStore::with_hits(vec![france_hit()]),
            FakeWebSearch::returning(Vec::new()),
            ScriptedProvider::answering("Paris."),
            MemoryConversationStore::default(),
        );

        let response = h
            .orchestrator
            .handle_query(QueryRequest::new("What is the capital of France?"), "key-1")
            .await
            .unwrap();

        assert_eq!(response.answer, "Paris.");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].source_type, ContextSourceType::VectorStore);
        assert_eq!(response.sources[0].document_id.as_deref(), Some(france_hit().document.id.as_str()));
        assert!(!response.metadata.web_search_used);
        assert_eq!(h.web.call_count(), 0);

        let saved = h.conversations.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(response.conversation_id.as_deref(), Some(saved[0].id.as_str()));
        assert_eq!(saved[0].ai_response, "Paris.");

        let prompt = h.provider.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Paris is the capital"));
        assert!(prompt.ends_with("Question: What is the capital of France?"));
    }

    #[tokio::test]
    async fn both_legs_failing_still_answers() {
        let h = harness(
            FakeEmbedder::failing(),
            MemoryVectorStore::failing(),
            FakeWebSearch::failing(),
            ScriptedProvider::answering("I could not find sources."),
            MemoryConversationStore::default(),
        );
        let mut request = QueryRequest::new("What happened in tech news today?");
        request.use_web_search = Some(true);

        let response = h.orchestrator.handle_query(request, "key-1").await.unwrap();

        assert_eq!(response.answer, "I could not find sources.");
        assert!(response.metadata.vector_failed);
        assert!(response.metadata.web_failed);
        assert!(!response.metadata.web_search_used);
        assert!(response.sources.is_empty());
        assert!(response.conversation_id.is_some());
    }

    #[tokio::test]
    async fn slow_legs_time_out_and_are_flagged() {
        let mut h = harness(
            FakeEmbedder::fixed(vec![1.0, 0.0]).with_delay(Duration::from_millis(500)),
            MemoryVectorStore::with_hits(vec![france_hit()]),
            FakeWebSearch::returning(Vec::new()).with_delay(Duration::from_millis(500)),
            ScriptedProvider::answering("Best effort."),
            MemoryConversationStore::default(),
        );
        h.orchestrator.settings.vector_timeout = Duration::from_millis(20);
        h.orchestrator.settings.web_timeout = Duration::from_millis(20);
        let mut request = QueryRequest::new("What is the capital of France?");
        request.use_web_search = Some(true);

        let response = h.orchestrator.handle_query(request, "key-1").await.unwrap();

        assert_eq!(response.answer, "Best effort.");
        assert!(response.metadata.vector_failed);
        assert!(response.metadata.web_failed);
        assert!(response.sources.is_empty());
        assert_eq!(h.web.call_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_are_fatal_and_audited() {
        let h = harness(
            FakeEmbedder::fixed(vec![1.0, 0.0]),
            MemoryVectorStore::with_hits(vec![france_hit()]),
            FakeWebSearch::returning(Vec::new()),
            ScriptedProvider::failing(GenerationError::Transient("503".into())),
            MemoryConversationStore::default(),
        );

        let err = h
            .orchestrator
            .handle_query(QueryRequest::new("What is the capital of France?"), "key-1")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::GenerationFailed(_)));
        assert_eq!(h.provider.call_count(), 3);

        let saved = h.conversations.saved();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].is_failure_audit());
        assert!(saved[0].ai_response.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_returns_answer_without_id() {
        let h = harness(
            FakeEmbedder::fixed(vec![1.0, 0.0]),
            MemoryVectorStore::default(),
            FakeWebSearch::returning(Vec::new()),
            ScriptedProvider::answering("ok"),
            MemoryConversationStore::failing_writes(),
        );

        let response = h
            .orchestrator
            .handle_query(QueryRequest::new("Explain borrowing"), "key-1")
            .await
            .unwrap();

        assert_eq!(response.answer, "ok");
        assert!(response.conversation_id.is_none());
        assert!(response.metadata.persist_failed);
    }

    #[tokio::test]
    async fn web_results_enter_context_when_routed() {
        let h = harness(
            FakeEmbedder::fixed(vec![1.0, 0.0]),
            MemoryVectorStore::default(),
            FakeWebSearch::returning(vec![WebResult {
                title: "Rust 1.83".into(),
                snippet: "Rust 1.83 was released with new const features.".into(),
                url: "https://blog.rust-lang.org".into(),
            }]),
            ScriptedProvider::answering("1.83"),
            MemoryConversationStore::default(),
        );

        let response = h
            .orchestrator
            .handle_query(QueryRequest::new("What is the latest Rust release?"), "key-1")
            .await
            .unwrap();

        assert!(response.metadata.web_search_used);
        assert_eq!(response.sources[0].source_type, ContextSourceType::Web);
        assert_eq!(h.web.call_count(), 1);
    }

    #[tokio::test]
    async fn session_history_is_loaded_into_prompt() {
        let h = harness(
            FakeEmbedder::fixed(vec![1.0, 0.0]),
            MemoryVectorStore::default(),
            FakeWebSearch::returning(Vec::new()),
            ScriptedProvider::answering("answer"),
            MemoryConversationStore::default(),
        );
        let mut first = QueryRequest::new("What is ownership?");
        first.session_id = Some("session-a".into());
        let first = h.orchestrator.handle_query(first, "k").await.unwrap();
        assert_eq!(first.session_id, "session-a");

        let mut second = QueryRequest::new("And borrowing?");
        second.session_id = Some("session-a".into());
        h.orchestrator.handle_query(second, "k").await.unwrap();

        let prompts = h.provider.prompts.lock().unwrap().clone();
        assert!(prompts[1].contains("User: What is ownership?"));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_any_work() {
        let h = harness(
            FakeEmbedder::fixed(vec![1.0]),
            MemoryVectorStore::default(),
            FakeWebSearch::returning(Vec::new()),
            ScriptedProvider::answering("x"),
            MemoryConversationStore::default(),
        );
        let mut request = QueryRequest::new("q");
        request.temperature = Some(5.0);

        let err = h.orchestrator.handle_query(request, "k").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(h.provider.call_count(), 0);
    }
}
