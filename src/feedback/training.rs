//! Re-vectorizes conversations flagged `to_vectorize` so that good answers
//! become retrievable knowledge.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::errors::ApiError;
use crate::embedding::EmbeddingClient;
use crate::history::{ConversationStore, MAX_VECTORIZE_ATTEMPTS};
use crate::models::{Conversation, Document, DocumentMetadata, FlagType, SourceType};
use crate::rag::VectorStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrainingReport {
    pub examined: usize,
    pub documents_created: usize,
    /// Already in the vector store under the same content id.
    pub already_present: usize,
    /// Failure-audit records, which carry no answer to learn from.
    pub skipped: usize,
    /// Embedding failed; retried after fresher items.
    pub failed: usize,
    /// Failed too often and left the queue.
    pub abandoned: usize,
}

#[derive(Clone)]
pub struct TrainingPipeline {
    conversations: Arc<dyn ConversationStore>,
    embedder: Arc<dyn EmbeddingClient>,
    vector_store: Arc<dyn VectorStore>,
}

/// Q/A text stored for a conversation.
pub fn training_content(conversation: &Conversation) -> String {
    format!(
        "Question: {}\nRéponse: {}",
        conversation.user_query.trim(),
        conversation.ai_response.trim()
    )
}

impl TrainingPipeline {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        embedder: Arc<dyn EmbeddingClient>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            conversations,
            embedder,
            vector_store,
        }
    }

    /// Processes up to `limit` pending conversations. Idempotent: content ids
    /// are derived from the text and processed conversations leave the queue.
    pub async fn process_training_queue(&self, limit: usize) -> Result<TrainingReport, ApiError> {
        let pending = self
            .conversations
            .list_flagged(FlagType::ToVectorize, limit)
            .await?;
        let mut report = TrainingReport {
            examined: pending.len(),
            ..TrainingReport::default()
        };

        for conversation in pending {
            if conversation.ai_response.trim().is_empty() {
                self.conversations
                    .mark_processed(&conversation.id, None)
                    .await?;
                report.skipped += 1;
                continue;
            }

            let metadata = DocumentMetadata {
                title: Some(format!("Conversation {}", conversation.id)),
                tags: vec!["feedback".to_string()],
                created_at: conversation.created_at,
                ..DocumentMetadata::default()
            };
            let document = Document::new(
                &training_content(&conversation),
                SourceType::Conversation,
                conversation.id.clone(),
            )
            .with_metadata(metadata);

            if self.vector_store.contains(&document.id).await? {
                self.conversations
                    .mark_processed(&conversation.id, Some(&document.id))
                    .await?;
                report.already_present += 1;
                continue;
            }

            let embedding = match self.embedder.embed(&document.content).await {
                Ok(embedding) => embedding,
                Err(err) => {
                    let attempts = self
                        .conversations
                        .record_failed_attempt(&conversation.id)
                        .await?;
                    report.failed += 1;
                    if attempts >= MAX_VECTORIZE_ATTEMPTS {
                        report.abandoned += 1;
                        tracing::error!(
                            conversation_id = %conversation.id,
                            attempts,
                            "Embedding failed, giving up on conversation: {}",
                            err
                        );
                    } else {
                        tracing::warn!(
                            conversation_id = %conversation.id,
                            attempts,
                            "Embedding failed, leaving conversation queued: {}",
                            err
                        );
                    }
                    continue;
                }
            };

            let document_id = self
                .vector_store
                .upsert(document.with_embedding(embedding))
                .await?;
            self.conversations
                .mark_processed(&conversation.id, Some(&document_id))
                .await?;
            report.documents_created += 1;
            tracing::debug!(conversation_id = %conversation.id, document_id = %document_id, "Conversation vectorized");
        }

        tracing::info!(
            examined = report.examined,
            created = report.documents_created,
            already_present = report.already_present,
            skipped = report.skipped,
            failed = report.failed,
            abandoned = report.abandoned,
            "Training batch finished"
        );
        Ok(report)
    }

    /// Runs batches forever: `interval` between successful batches,
    /// `error_backoff` after a failed one.
    pub async fn run_continuous<F, Fut>(
        &self,
        limit: usize,
        interval: Duration,
        error_backoff: Duration,
        mut after_batch: F,
    ) where
        F: FnMut(TrainingReport) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            match self.process_training_queue(limit).await {
                Ok(report) => {
                    after_batch(report).await;
                    tokio::time::sleep(interval).await;
                }
                Err(err) => {
                    tracing::error!(
                        backoff_secs = error_backoff.as_secs(),
                        "Training batch failed: {}",
                        err
                    );
                    tokio::time::sleep(error_backoff).await;
                }
            }
        }
    }
}
