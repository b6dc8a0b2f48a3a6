//! SQLite-backed vector store.
//!
//! Documents and their embeddings (little-endian f32 blobs) live in one
//! table; search is a brute-force cosine scan.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::store::VectorStore;
use crate::core::errors::ApiError;
use crate::db;
use crate::models::{Document, DocumentMatch, DocumentMetadata, SourceType};
use crate::vector_math::relevance_score;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: &Path) -> Result<Self, ApiError> {
        let pool = db::connect(db_path).await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, ApiError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source_type TEXT NOT NULL,
                source_id TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_type, source_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, ApiError> {
        let source_type: String = row.get("source_type");
        let metadata_str: String = row.get("metadata");
        let embedding_bytes: Vec<u8> = row.get("embedding");

        let metadata = serde_json::from_str::<DocumentMetadata>(&metadata_str)
            .map_err(|e| ApiError::internal(format!("Corrupt document metadata: {}", e)))?;

        Ok(Document {
            id: row.get("id"),
            content: row.get("content"),
            source_type: source_type.parse::<SourceType>().map_err(ApiError::internal)?,
            source_id: row.get("source_id"),
            embedding: Some(Self::deserialize_embedding(&embedding_bytes)),
            metadata,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<DocumentMatch>, ApiError> {
        if query_embedding.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, content, source_type, source_id, metadata, embedding FROM documents",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut matches = Vec::new();
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let stored = Self::deserialize_embedding(&embedding_bytes);
            let similarity = relevance_score(query_embedding, &stored);
            if similarity < min_similarity {
                continue;
            }
            matches.push(DocumentMatch {
                document: Self::row_to_document(row)?,
                similarity,
            });
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn upsert(&self, document: Document) -> Result<String, ApiError> {
        let embedding = document
            .embedding
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ApiError::validation("document has no embedding"))?;
        let blob = Self::serialize_embedding(embedding);
        let metadata_str = serde_json::to_string(&document.metadata).map_err(ApiError::internal)?;
        let created_at = db::format_timestamp(&document.metadata.created_at);
        let now = db::format_timestamp(&chrono::Utc::now());

        sqlx::query(
            "INSERT INTO documents (id, content, source_type, source_id, metadata, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                source_type = excluded.source_type,
                source_id = excluded.source_id,
                metadata = excluded.metadata,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at",
        )
        .bind(&document.id)
        .bind(&document.content)
        .bind(document.source_type.as_str())
        .bind(&document.source_id)
        .bind(&metadata_str)
        .bind(&blob)
        .bind(&created_at)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(document.id)
    }

    async fn contains(&self, document_id: &str) -> Result<bool, ApiError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM documents WHERE id = ?1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(found.is_some())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (SqliteVectorStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::with_path(&dir.path().join("rag.db"))
            .await
            .unwrap();
        (store, dir)
    }

    fn doc(content: &str, embedding: Vec<f32>) -> Document {
        Document::new(content, SourceType::Manual, "notes").with_embedding(embedding)
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let (store, _dir) = test_store().await;

        let id = store.upsert(doc("Paris is the capital of France", vec![1.0, 0.0, 0.0])).await.unwrap();
        store.upsert(doc("Rust has no garbage collector", vec![0.0, 1.0, 0.0])).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.contains(&id).await.unwrap());

        let results = store.search(&[1.0, 0.1, 0.0], 10, 0.7).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, id);
        assert!(results[0].similarity > 0.99);
        assert_eq!(results[0].document.metadata.language, "fr");
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_truncates() {
        let (store, _dir) = test_store().await;

        store.upsert(doc("first", vec![1.0, 0.0])).await.unwrap();
        store.upsert(doc("second", vec![0.8, 0.6])).await.unwrap();
        store.upsert(doc("third", vec![0.6, 0.8])).await.unwrap();

        let results = store.search(&[1.0, 0.0], 2, 0.0).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|m| m.document.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(results.iter().all(|m| (0.0..=1.0).contains(&m.similarity)));
    }

    #[tokio::test]
    async fn upsert_same_content_replaces_row() {
        let (store, _dir) = test_store().await;

        let first = store.upsert(doc("same   text", vec![1.0, 0.0])).await.unwrap();
        let second = store.upsert(doc("same text", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.search(&[0.0, 1.0], 5, 0.9).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn upsert_requires_embedding() {
        let (store, _dir) = test_store().await;
        let err = store
            .upsert(Document::new("no vector", SourceType::Manual, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
