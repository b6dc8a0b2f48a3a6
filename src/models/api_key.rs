use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyScope {
    Query,
    Ingest,
    Feedback,
    Admin,
}

impl ApiKeyScope {
    pub const ALL: [ApiKeyScope; 4] = [
        ApiKeyScope::Query,
        ApiKeyScope::Ingest,
        ApiKeyScope::Feedback,
        ApiKeyScope::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyScope::Query => "query",
            ApiKeyScope::Ingest => "ingest",
            ApiKeyScope::Feedback => "feedback",
            ApiKeyScope::Admin => "admin",
        }
    }
}

impl fmt::Display for ApiKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKeyScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "query" => Ok(ApiKeyScope::Query),
            "ingest" => Ok(ApiKeyScope::Ingest),
            "feedback" => Ok(ApiKeyScope::Feedback),
            "admin" => Ok(ApiKeyScope::Admin),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

/// Scopes after expansion: `admin` grants every other scope.
pub fn effective_scopes(granted: &[ApiKeyScope]) -> BTreeSet<ApiKeyScope> {
    if granted.contains(&ApiKeyScope::Admin) {
        ApiKeyScope::ALL.into_iter().collect()
    } else {
        granted.iter().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: Vec<ApiKeyScope>,
    pub rate_limit_per_minute: u32,
    pub monthly_quota: Option<u64>,
    pub usage_count: u64,
    /// Requests in the current calendar month, counted against the quota.
    pub monthly_usage: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub metadata: Value,
}

impl ApiKey {
    pub fn has_scope(&self, required: ApiKeyScope) -> bool {
        effective_scopes(&self.scopes).contains(&required)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn quota_exhausted(&self) -> bool {
        self.monthly_quota
            .map(|quota| self.monthly_usage >= quota)
            .unwrap_or(false)
    }
}

pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;
const MAX_RATE_LIMIT_PER_MINUTE: u32 = 10_000;
const MAX_EXPIRY_DAYS: i64 = 3_650;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyCreate {
    pub name: String,
    pub scopes: Vec<ApiKeyScope>,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub monthly_quota: Option<u64>,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl ApiKeyCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        let name_len = self.name.trim().chars().count();
        if !(3..=100).contains(&name_len) {
            return Err(ApiError::validation(
                "name must be between 3 and 100 characters",
            ));
        }
        if self.scopes.is_empty() {
            return Err(ApiError::validation("at least one scope is required"));
        }
        if let Some(limit) = self.rate_limit_per_minute {
            if !(1..=MAX_RATE_LIMIT_PER_MINUTE).contains(&limit) {
                return Err(ApiError::validation(format!(
                    "rate_limit_per_minute must be between 1 and {}",
                    MAX_RATE_LIMIT_PER_MINUTE
                )));
            }
        }
        if self.monthly_quota == Some(0) {
            return Err(ApiError::validation("monthly_quota must be positive"));
        }
        if let Some(days) = self.expires_in_days {
            if !(1..=MAX_EXPIRY_DAYS).contains(&days) {
                return Err(ApiError::validation(format!(
                    "expires_in_days must be between 1 and {}",
                    MAX_EXPIRY_DAYS
                )));
            }
        }
        if let Some(metadata) = &self.metadata {
            if !metadata.is_object() {
                return Err(ApiError::validation("metadata must be an object"));
            }
        }
        Ok(())
    }

    /// Scopes in canonical order with duplicates removed.
    pub fn normalized_scopes(&self) -> Vec<ApiKeyScope> {
        self.scopes
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
