//! Manual text ingestion into the vector store.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::embedding::EmbeddingClient;
use crate::models::{content_id, normalize_content, Document, DocumentMetadata, SourceType};
use crate::rag::VectorStore;

const MIN_CONTENT_CHARS: usize = 10;
const MAX_CONTENT_CHARS: usize = 200_000;
const MAX_TAGS: usize = 20;
const EMBED_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct IngestTextRequest {
    pub content: String,
    pub source_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl IngestTextRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let len = self.content.trim().chars().count();
        if len < MIN_CONTENT_CHARS {
            return Err(ApiError::validation(format!(
                "content must be at least {} characters",
                MIN_CONTENT_CHARS
            )));
        }
        if len > MAX_CONTENT_CHARS {
            return Err(ApiError::validation(format!(
                "content must be at most {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        if self.source_id.trim().is_empty() {
            return Err(ApiError::validation("source_id must not be empty"));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(ApiError::validation(format!(
                "at most {} tags are allowed",
                MAX_TAGS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub documents_created: usize,
    pub documents_skipped: usize,
    pub errors: usize,
    pub message: String,
}

pub struct IngestService {
    embedder: Arc<dyn EmbeddingClient>,
    vector_store: Arc<dyn VectorStore>,
    max_chunk_chars: usize,
}

impl IngestService {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        vector_store: Arc<dyn VectorStore>,
        max_chunk_chars: usize,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            max_chunk_chars: max_chunk_chars.max(MIN_CONTENT_CHARS),
        }
    }

    /// Splits, embeds and stores the text as `manual` documents. Chunks
    /// whose content hash is already stored (or repeated within the text)
    /// are skipped. Embeddings run concurrently, stores stay in order.
    pub async fn ingest_text(&self, request: &IngestTextRequest) -> Result<IngestResponse, ApiError> {
        request.validate()?;

        let source_id = request.source_id.trim();
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let tags: Vec<String> = request
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let mut response = IngestResponse {
            success: true,
            documents_created: 0,
            documents_skipped: 0,
            errors: 0,
            message: String::new(),
        };

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for chunk in split_into_chunks(&request.content, self.max_chunk_chars) {
            let id = content_id(&chunk);
            if !seen.insert(id.clone()) || self.vector_store.contains(&id).await? {
                response.documents_skipped += 1;
                continue;
            }
            pending.push(chunk);
        }

        let embedded: Vec<_> = stream::iter(pending)
            .map(|chunk| async move {
                let embedding = self.embedder.embed(&chunk).await;
                (chunk, embedding)
            })
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        for (chunk, embedding) in embedded {
            let embedding = match embedding {
                Ok(embedding) => embedding,
                Err(err) => {
                    tracing::warn!(source_id = %source_id, "Embedding failed for chunk: {}", err);
                    response.errors += 1;
                    continue;
                }
            };

            let metadata = DocumentMetadata {
                title: title.clone(),
                tags: tags.clone(),
                ..DocumentMetadata::default()
            };
            let document = Document::new(&chunk, SourceType::Manual, source_id)
                .with_metadata(metadata)
                .with_embedding(embedding);

            match self.vector_store.upsert(document).await {
                Ok(_) => response.documents_created += 1,
                Err(err) => {
                    tracing::warn!(source_id = %source_id, "Failed to store chunk: {}", err);
                    response.errors += 1;
                }
            }
        }

        response.success = response.errors == 0;
        response.message = format!(
            "{} document(s) created, {} skipped, {} error(s)",
            response.documents_created, response.documents_skipped, response.errors
        );
        tracing::info!(
            source_id = %source_id,
            created = response.documents_created,
            skipped = response.documents_skipped,
            errors = response.errors,
            "Text ingested"
        );
        Ok(response)
    }
}

/// Normalized chunks of at most `max_chars` characters, cut at sentence
/// ends where possible and otherwise at word boundaries.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let normalized = normalize_content(text);
    let chars: Vec<char> = normalized.chars().collect();
    let max_chars = max_chars.max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let cut = if end < chars.len() {
            find_break(&chars[start..end]).map(|i| start + i).unwrap_or(end)
        } else {
            end
        };

        let chunk: String = chars[start..cut].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        start = cut;
    }
    chunks
}

/// Index just past the last sentence end outside the first third of the
/// window, else just past the last space.
fn find_break(window: &[char]) -> Option<usize> {
    let min_len = window.len() / 3;
    let sentence = window
        .iter()
        .enumerate()
        .skip(min_len)
        .rev()
        .find(|&(i, c)| {
            matches!(*c, '.' | '!' | '?') && window.get(i + 1).map(|n| *n == ' ').unwrap_or(false)
        })
        .map(|(i, _)| i + 1);

    sentence.or_else(|| {
        window
            .iter()
            .rposition(|c| *c == ' ')
            .filter(|i| *i > 0)
            .map(|i| i + 1)
    })
}
