//! VectorStore trait: the persistence boundary for retrievable documents.

use async_trait::async_trait;

use crate::core::errors::ApiError;
use crate::models::{Document, DocumentMatch};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Documents whose similarity to `query_embedding` is at least
    /// `min_similarity`, best first, at most `top_k`.
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<DocumentMatch>, ApiError>;

    /// Inserts or replaces the document under its id and returns the id.
    /// The document must carry an embedding.
    async fn upsert(&self, document: Document) -> Result<String, ApiError>;

    async fn contains(&self, document_id: &str) -> Result<bool, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;
}
