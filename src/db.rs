use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::errors::ApiError;

/// Opens (creating if needed) a WAL-mode SQLite pool with foreign keys on.
pub async fn connect(db_path: &Path) -> Result<SqlitePool, ApiError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| {
            ApiError::internal(format!(
                "Failed to open database {}: {}",
                db_path.display(),
                e
            ))
        })
}

/// Timestamps are stored as fixed-width UTC RFC 3339 text so that string
/// comparison and `substr(created_at, 1, 10)` behave like date arithmetic.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| ApiError::internal(format!("Corrupt timestamp '{}': {}", value, e)))
}
