//! In-process fakes of the collaborator traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::errors::ApiError;
use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::history::{AnalyticsSummary, ConversationStore, MAX_VECTORIZE_ATTEMPTS};
use crate::models::{Conversation, Document, DocumentMatch, FeedbackFlag, FlagType};
use crate::rag::VectorStore;
use crate::search::{SearchError, WebResult, WebSearchClient};
use crate::vector_math::relevance_score;

/// Embeds every text to the same vector, or fails when `vector` is `None`.
pub struct FakeEmbedder {
    pub vector: Option<Vec<f32>>,
    pub calls: AtomicUsize,
    /// Longer inputs are rejected with a 400, like a model context limit.
    pub max_chars: Option<usize>,
    pub delay: Option<Duration>,
}

impl FakeEmbedder {
    pub fn fixed(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            calls: AtomicUsize::new(0),
            max_chars: None,
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            vector: None,
            ..Self::fixed(Vec::new())
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    fn model(&self) -> &str {
        "fake-embed"
    }

    fn dimension(&self) -> usize {
        self.vector.as_ref().map(Vec::len).unwrap_or(0)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        if self.max_chars.is_some_and(|max| text.chars().count() > max) {
            return Err(EmbeddingError::Api {
                status: 400,
                message: "input too long".into(),
            });
        }
        self.vector
            .clone()
            .ok_or_else(|| EmbeddingError::Request("connection refused".into()))
    }
}

#[derive(Default)]
pub struct MemoryVectorStore {
    pub documents: Mutex<HashMap<String, Document>>,
    /// Canned hits returned by `search` instead of scanning.
    pub canned: Mutex<Option<Vec<DocumentMatch>>>,
    pub fail_search: AtomicBool,
}

impl MemoryVectorStore {
    pub fn with_hits(hits: Vec<DocumentMatch>) -> Self {
        let store = Self::default();
        *store.canned.lock().unwrap() = Some(hits);
        store
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_search.store(true, Ordering::SeqCst);
        store
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<DocumentMatch>, ApiError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(ApiError::internal("vector store offline"));
        }
        if let Some(hits) = self.canned.lock().unwrap().clone() {
            return Ok(hits);
        }
        let mut hits: Vec<DocumentMatch> = self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter_map(|doc| {
                let similarity = relevance_score(query_embedding, doc.embedding.as_deref()?);
                (similarity >= min_similarity).then(|| DocumentMatch {
                    document: doc.clone(),
                    similarity,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert(&self, document: Document) -> Result<String, ApiError> {
        if document.embedding.as_ref().map(Vec::is_empty).unwrap_or(true) {
            return Err(ApiError::validation("document has no embedding"));
        }
        let id = document.id.clone();
        self.documents.lock().unwrap().insert(id.clone(), document);
        Ok(id)
    }

    async fn contains(&self, document_id: &str) -> Result<bool, ApiError> {
        Ok(self.documents.lock().unwrap().contains_key(document_id))
    }

    async fn count(&self) -> Result<usize, ApiError> {
        Ok(self.len())
    }
}

pub struct FakeWebSearch {
    pub results: Result<Vec<WebResult>, ()>,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeWebSearch {
    pub fn returning(results: Vec<WebResult>) -> Self {
        Self {
            results: Ok(results),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            results: Err(()),
            ..Self::returning(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchClient for FakeWebSearch {
    fn provider(&self) -> &str {
        "fake"
    }

    async fn search(&self, _query: &str) -> Result<Vec<WebResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.results.clone().map_err(|_| SearchError::Status {
            provider: "fake",
            status: 503,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackEntry {
    pub flag: FeedbackFlag,
    pub processed: bool,
    pub attempts: u32,
}

#[derive(Default)]
pub struct MemoryConversationStore {
    pub conversations: Mutex<Vec<Conversation>>,
    pub feedback: Mutex<HashMap<String, FeedbackEntry>>,
    pub fail_writes: AtomicBool,
}

impl MemoryConversationStore {
    pub fn failing_writes() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub fn saved(&self) -> Vec<Conversation> {
        self.conversations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create(&self, conversation: &Conversation) -> Result<(), ApiError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ApiError::internal("database is locked"));
        }
        self.conversations.lock().unwrap().push(conversation.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>, ApiError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_recent_by_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, ApiError> {
        let conversations = self.conversations.lock().unwrap();
        let turns: Vec<Conversation> = conversations
            .iter()
            .filter(|c| c.session_id == session_id && !c.ai_response.is_empty())
            .cloned()
            .collect();
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.into_iter().skip(skip).collect())
    }

    async fn upsert_feedback(&self, flag: &FeedbackFlag) -> Result<(), ApiError> {
        let mut feedback = self.feedback.lock().unwrap();
        let (processed, attempts) = feedback
            .get(&flag.conversation_id)
            .filter(|old| old.flag.flag_type == flag.flag_type)
            .map(|old| (old.processed, old.attempts))
            .unwrap_or((false, 0));
        feedback.insert(
            flag.conversation_id.clone(),
            FeedbackEntry {
                flag: flag.clone(),
                processed,
                attempts,
            },
        );
        Ok(())
    }

    async fn get_feedback(&self, conversation_id: &str) -> Result<Option<FeedbackFlag>, ApiError> {
        Ok(self
            .feedback
            .lock()
            .unwrap()
            .get(conversation_id)
            .map(|entry| entry.flag.clone()))
    }

    async fn list_flagged(
        &self,
        flag_type: FlagType,
        limit: usize,
    ) -> Result<Vec<Conversation>, ApiError> {
        let feedback = self.feedback.lock().unwrap();
        let conversations = self.conversations.lock().unwrap();
        let mut pending: Vec<(u32, Conversation)> = conversations
            .iter()
            .filter_map(|c| {
                feedback
                    .get(&c.id)
                    .filter(|entry| {
                        entry.flag.flag_type == flag_type
                            && !entry.processed
                            && entry.attempts < MAX_VECTORIZE_ATTEMPTS
                    })
                    .map(|entry| (entry.attempts, c.clone()))
            })
            .collect();
        // Stable: insertion order stands in for feedback age.
        pending.sort_by_key(|(attempts, _)| *attempts);
        Ok(pending.into_iter().take(limit).map(|(_, c)| c).collect())
    }

    async fn mark_processed(
        &self,
        conversation_id: &str,
        _document_id: Option<&str>,
    ) -> Result<(), ApiError> {
        if let Some(entry) = self.feedback.lock().unwrap().get_mut(conversation_id) {
            entry.processed = true;
        }
        Ok(())
    }

    async fn record_failed_attempt(&self, conversation_id: &str) -> Result<u32, ApiError> {
        Ok(self
            .feedback
            .lock()
            .unwrap()
            .get_mut(conversation_id)
            .map(|entry| {
                entry.attempts += 1;
                entry.attempts
            })
            .unwrap_or(0))
    }

    async fn analytics(&self, days: u32) -> Result<AnalyticsSummary, ApiError> {
        Ok(AnalyticsSummary {
            days,
            total_conversations: self.conversations.lock().unwrap().len() as i64,
            avg_feedback_score: None,
            flagged_count: 0,
            feedback_distribution: Default::default(),
            daily_counts: Default::default(),
        })
    }

    async fn health_check(&self) -> Result<(), ApiError> {
        Ok(())
    }
}
