//! Conversation and feedback persistence.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::db;
use crate::models::{Conversation, FeedbackFlag, FlagType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub days: u32,
    pub total_conversations: i64,
    pub avg_feedback_score: Option<f64>,
    pub flagged_count: i64,
    pub feedback_distribution: BTreeMap<String, i64>,
    /// Conversations per UTC day (`YYYY-MM-DD`).
    pub daily_counts: BTreeMap<String, i64>,
}

/// Flagged conversations that failed this many times leave the queue until
/// their feedback changes.
pub const MAX_VECTORIZE_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, conversation: &Conversation) -> Result<(), ApiError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>, ApiError>;

    /// Last `limit` answered turns of a session, oldest first.
    async fn list_recent_by_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, ApiError>;

    /// Replaces any previous feedback of the same conversation.
    async fn upsert_feedback(&self, flag: &FeedbackFlag) -> Result<(), ApiError>;

    async fn get_feedback(&self, conversation_id: &str) -> Result<Option<FeedbackFlag>, ApiError>;

    /// Conversations whose current feedback has `flag_type`, has not been
    /// processed yet and has failed fewer than [`MAX_VECTORIZE_ATTEMPTS`]
    /// times. Fewest failures first, then oldest feedback first.
    async fn list_flagged(
        &self,
        flag_type: FlagType,
        limit: usize,
    ) -> Result<Vec<Conversation>, ApiError>;

    async fn mark_processed(
        &self,
        conversation_id: &str,
        document_id: Option<&str>,
    ) -> Result<(), ApiError>;

    /// Counts one failed processing attempt; returns the new total.
    async fn record_failed_attempt(&self, conversation_id: &str) -> Result<u32, ApiError>;

    async fn analytics(&self, days: u32) -> Result<AnalyticsSummary, ApiError>;

    async fn health_check(&self) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
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
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                user_query TEXT NOT NULL,
                ai_response TEXT NOT NULL,
                context_sources TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init conversations table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_session
             ON conversations(session_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS feedback (
                conversation_id TEXT PRIMARY KEY,
                score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
                comment TEXT,
                flag_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                processed_at TEXT,
                document_id TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init feedback table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feedback_pending
             ON feedback(flag_type, processed_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, ApiError> {
        let sources: String = row.get("context_sources");
        let metadata: String = row.get("metadata");
        let created_at: String = row.get("created_at");

        Ok(Conversation {
            id: row.get("id"),
            session_id: row.get("session_id"),
            user_query: row.get("user_query"),
            ai_response: row.get("ai_response"),
            context_sources: serde_json::from_str(&sources)
                .map_err(|e| ApiError::internal(format!("Corrupt context sources: {}", e)))?,
            metadata: serde_json::from_str(&metadata)
                .map_err(|e| ApiError::internal(format!("Corrupt conversation metadata: {}", e)))?,
            created_at: db::parse_timestamp(&created_at)?,
        })
    }

    fn row_to_feedback(row: &SqliteRow) -> Result<FeedbackFlag, ApiError> {
        let score: i64 = row.get("score");
        let flag_type: String = row.get("flag_type");
        let created_at: String = row.get("created_at");

        Ok(FeedbackFlag {
            conversation_id: row.get("conversation_id"),
            score: u8::try_from(score).map_err(ApiError::internal)?,
            comment: row.get("comment"),
            flag_type: flag_type.parse().map_err(ApiError::internal)?,
            created_at: db::parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create(&self, conversation: &Conversation) -> Result<(), ApiError> {
        let sources =
            serde_json::to_string(&conversation.context_sources).map_err(ApiError::internal)?;
        let metadata = serde_json::to_string(&conversation.metadata).map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO conversations
                (id, session_id, user_query, ai_response, context_sources, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.session_id)
        .bind(&conversation.user_query)
        .bind(&conversation.ai_response)
        .bind(sources)
        .bind(metadata)
        .bind(db::format_timestamp(&conversation.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save conversation: {}", e)))?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>, ApiError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn list_recent_by_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT * FROM conversations
             WHERE session_id = ? AND ai_response != ''
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut turns = rows
            .iter()
            .map(Self::row_to_conversation)
            .collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn upsert_feedback(&self, flag: &FeedbackFlag) -> Result<(), ApiError> {
        // A changed flag type re-queues the conversation for training.
        sqlx::query(
            "INSERT INTO feedback (conversation_id, score, comment, flag_type, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id) DO UPDATE SET
                score = excluded.score,
                comment = excluded.comment,
                created_at = excluded.created_at,
                processed_at = CASE WHEN feedback.flag_type = excluded.flag_type
                                    THEN feedback.processed_at ELSE NULL END,
                document_id = CASE WHEN feedback.flag_type = excluded.flag_type
                                   THEN feedback.document_id ELSE NULL END,
                attempts = CASE WHEN feedback.flag_type = excluded.flag_type
                                THEN feedback.attempts ELSE 0 END,
                flag_type = excluded.flag_type",
        )
        .bind(&flag.conversation_id)
        .bind(flag.score as i64)
        .bind(&flag.comment)
        .bind(flag.flag_type.as_str())
        .bind(db::format_timestamp(&flag.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save feedback: {}", e)))?;

        Ok(())
    }

    async fn get_feedback(&self, conversation_id: &str) -> Result<Option<FeedbackFlag>, ApiError> {
        let row = sqlx::query("SELECT * FROM feedback WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref().map(Self::row_to_feedback).transpose()
    }

    async fn list_flagged(
        &self,
        flag_type: FlagType,
        limit: usize,
    ) -> Result<Vec<Conversation>, ApiError> {
        let rows = sqlx::query(
            "SELECT c.* FROM conversations c
             JOIN feedback f ON f.conversation_id = c.id
             WHERE f.flag_type = ? AND f.processed_at IS NULL AND f.attempts < ?
             ORDER BY f.attempts ASC, f.created_at ASC
             LIMIT ?",
        )
        .bind(flag_type.as_str())
        .bind(MAX_VECTORIZE_ATTEMPTS as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn mark_processed(
        &self,
        conversation_id: &str,
        document_id: Option<&str>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE feedback SET processed_at = ?, document_id = ? WHERE conversation_id = ?",
        )
        .bind(db::format_timestamp(&Utc::now()))
        .bind(document_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn record_failed_attempt(&self, conversation_id: &str) -> Result<u32, ApiError> {
        let attempts: Option<i64> = sqlx::query_scalar(
            "UPDATE feedback SET attempts = attempts + 1
             WHERE conversation_id = ?
             RETURNING attempts",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(attempts.unwrap_or(0) as u32)
    }

    async fn analytics(&self, days: u32) -> Result<AnalyticsSummary, ApiError> {
        let since = db::format_timestamp(&(Utc::now() - Duration::days(days as i64)));

        let total_conversations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE created_at >= ?")
                .bind(&since)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        let avg_feedback_score: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(f.score) FROM feedback f
             JOIN conversations c ON c.id = f.conversation_id
             WHERE c.created_at >= ?",
        )
        .bind(&since)
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let distribution_rows = sqlx::query(
            "SELECT f.flag_type, COUNT(*) AS n FROM feedback f
             JOIN conversations c ON c.id = f.conversation_id
             WHERE c.created_at >= ?
             GROUP BY f.flag_type",
        )
        .bind(&since)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let feedback_distribution: BTreeMap<String, i64> = distribution_rows
            .iter()
            .map(|row| (row.get::<String, _>("flag_type"), row.get::<i64, _>("n")))
            .collect();
        let flagged_count = feedback_distribution
            .get(FlagType::ToVectorize.as_str())
            .copied()
            .unwrap_or(0);

        let daily_rows = sqlx::query(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS n FROM conversations
             WHERE created_at >= ?
             GROUP BY day
             ORDER BY day ASC",
        )
        .bind(&since)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let daily_counts = daily_rows
            .iter()
            .map(|row| (row.get::<String, _>("day"), row.get::<i64, _>("n")))
            .collect();

        Ok(AnalyticsSummary {
            days,
            total_conversations,
            avg_feedback_score,
            flagged_count,
            feedback_distribution,
            daily_counts,
        })
    }

    async fn health_check(&self) -> Result<(), ApiError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ApiError::internal(format!("Database unreachable: {}", e)))?;
        Ok(())
    }
}
