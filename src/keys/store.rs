use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::db;
use crate::models::{ApiKey, ApiKeyScope};

/// Month bucket the quota counter belongs to, e.g. `2024-11`.
pub fn usage_month(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

#[derive(Clone)]
pub struct ApiKeyStore {
    pool: SqlitePool,
}

impl ApiKeyStore {
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
            "CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                key_hash TEXT NOT NULL UNIQUE,
                key_prefix TEXT NOT NULL,
                scopes TEXT NOT NULL,
                rate_limit_per_minute INTEGER NOT NULL,
                monthly_quota INTEGER,
                usage_count INTEGER NOT NULL DEFAULT 0,
                monthly_usage INTEGER NOT NULL DEFAULT 0,
                usage_month TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                last_used_at TEXT,
                metadata TEXT NOT NULL DEFAULT '{}'
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init api_keys table: {}", e)))?;

        Ok(())
    }

    fn row_to_key(row: &SqliteRow, current_month: &str) -> Result<ApiKey, ApiError> {
        let scopes: String = row.get("scopes");
        let scopes: Vec<String> = serde_json::from_str(&scopes)
            .map_err(|e| ApiError::internal(format!("Corrupt key scopes: {}", e)))?;
        let scopes = scopes
            .iter()
            .map(|s| s.parse::<ApiKeyScope>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)?;

        let metadata: String = row.get("metadata");
        let month: String = row.get("usage_month");
        let monthly_usage: i64 = if month == current_month {
            row.get("monthly_usage")
        } else {
            0
        };
        let created_at: String = row.get("created_at");
        let expires_at: Option<String> = row.get("expires_at");
        let last_used_at: Option<String> = row.get("last_used_at");
        let monthly_quota: Option<i64> = row.get("monthly_quota");
        let usage_count: i64 = row.get("usage_count");
        let rate_limit: i64 = row.get("rate_limit_per_minute");

        Ok(ApiKey {
            id: row.get("id"),
            name: row.get("name"),
            key_hash: row.get("key_hash"),
            key_prefix: row.get("key_prefix"),
            scopes,
            rate_limit_per_minute: rate_limit.max(0) as u32,
            monthly_quota: monthly_quota.map(|q| q.max(0) as u64),
            usage_count: usage_count.max(0) as u64,
            monthly_usage: monthly_usage.max(0) as u64,
            is_active: row.get::<i64, _>("is_active") != 0,
            created_at: db::parse_timestamp(&created_at)?,
            expires_at: expires_at.as_deref().map(db::parse_timestamp).transpose()?,
            last_used_at: last_used_at.as_deref().map(db::parse_timestamp).transpose()?,
            metadata: serde_json::from_str(&metadata).map_err(ApiError::internal)?,
        })
    }

    pub async fn create(&self, key: &ApiKey) -> Result<(), ApiError> {
        let scopes: Vec<&str> = key.scopes.iter().map(ApiKeyScope::as_str).collect();

        sqlx::query(
            "INSERT INTO api_keys
                (id, name, key_hash, key_prefix, scopes, rate_limit_per_minute, monthly_quota,
                 usage_count, monthly_usage, usage_month, is_active, created_at, expires_at,
                 last_used_at, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, '', ?, ?, ?, NULL, ?)",
        )
        .bind(&key.id)
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(serde_json::to_string(&scopes).map_err(ApiError::internal)?)
        .bind(key.rate_limit_per_minute as i64)
        .bind(key.monthly_quota.map(|q| q as i64))
        .bind(key.is_active as i64)
        .bind(db::format_timestamp(&key.created_at))
        .bind(key.expires_at.as_ref().map(db::format_timestamp))
        .bind(key.metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save API key: {}", e)))?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<ApiKey>, ApiError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let month = usage_month(&Utc::now());
        row.as_ref().map(|r| Self::row_to_key(r, &month)).transpose()
    }

    pub async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, ApiError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = ?")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let month = usage_month(&Utc::now());
        row.as_ref().map(|r| Self::row_to_key(r, &month)).transpose()
    }

    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
        include_inactive: bool,
    ) -> Result<Vec<ApiKey>, ApiError> {
        let rows = sqlx::query(
            "SELECT * FROM api_keys
             WHERE is_active = 1 OR ?
             ORDER BY created_at DESC
             LIMIT ? OFFSET ?",
        )
        .bind(include_inactive)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let month = usage_month(&Utc::now());
        rows.iter().map(|r| Self::row_to_key(r, &month)).collect()
    }

    /// Soft delete. Returns false when no key has this id.
    pub async fn revoke(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn record_usage(&self, id: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
        let month = usage_month(&at);
        sqlx::query(
            "UPDATE api_keys SET
                usage_count = usage_count + 1,
                monthly_usage = CASE WHEN usage_month = ? THEN monthly_usage + 1 ELSE 1 END,
                usage_month = ?,
                last_used_at = ?
             WHERE id = ?",
        )
        .bind(&month)
        .bind(&month)
        .bind(db::format_timestamp(&at))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }
}
