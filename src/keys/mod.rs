//! API key lifecycle: minting, validation and revocation.

pub mod store;

pub use store::ApiKeyStore;

use chrono::{Duration, Utc};
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::{generate_api_key, hash_api_key};
use crate::models::api_key::DEFAULT_RATE_LIMIT_PER_MINUTE;
use crate::models::{ApiKey, ApiKeyCreate};

pub const REASON_INVALID_KEY: &str = "invalid_key";
pub const REASON_KEY_REVOKED: &str = "key_revoked";
pub const REASON_KEY_EXPIRED: &str = "key_expired";

#[derive(Clone)]
pub struct ApiKeyService {
    store: ApiKeyStore,
    default_rate_limit: u32,
}

impl ApiKeyService {
    pub fn new(store: ApiKeyStore) -> Self {
        Self {
            store,
            default_rate_limit: DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }

    /// Per-minute limit for keys created without an explicit one.
    pub fn with_default_rate_limit(mut self, per_minute: u32) -> Self {
        self.default_rate_limit = per_minute.max(1);
        self
    }

    /// Returns the stored key together with the raw secret, which is never
    /// retrievable again.
    pub async fn create_key(&self, request: &ApiKeyCreate) -> Result<(ApiKey, String), ApiError> {
        request.validate()?;
        let generated = generate_api_key();
        let now = Utc::now();

        let key = ApiKey {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            key_hash: generated.hash,
            key_prefix: generated.display_prefix,
            scopes: request.normalized_scopes(),
            rate_limit_per_minute: request
                .rate_limit_per_minute
                .unwrap_or(self.default_rate_limit),
            monthly_quota: request.monthly_quota,
            usage_count: 0,
            monthly_usage: 0,
            is_active: true,
            created_at: now,
            expires_at: request.expires_in_days.map(|days| now + Duration::days(days)),
            last_used_at: None,
            metadata: request.metadata.clone().unwrap_or_else(|| json!({})),
        };
        self.store.create(&key).await?;

        tracing::info!(key_id = %key.id, name = %key.name, "API key created");
        Ok((key, generated.raw))
    }

    /// Resolves a presented secret to an active, unexpired key with quota
    /// left. Does not touch usage counters.
    pub async fn resolve(&self, raw: &str) -> Result<ApiKey, ApiError> {
        let key = self
            .store
            .get_by_hash(&hash_api_key(raw))
            .await?
            .ok_or(ApiError::InvalidApiKey(REASON_INVALID_KEY))?;

        if !key.is_active {
            return Err(ApiError::InvalidApiKey(REASON_KEY_REVOKED));
        }
        if key.is_expired_at(Utc::now()) {
            return Err(ApiError::InvalidApiKey(REASON_KEY_EXPIRED));
        }
        if key.quota_exhausted() {
            tracing::warn!(key_id = %key.id, "Monthly quota exhausted");
            return Err(ApiError::QuotaExceeded);
        }
        Ok(key)
    }

    /// Counts one accepted request against the key.
    pub async fn record_usage(&self, mut key: ApiKey) -> Result<ApiKey, ApiError> {
        let now = Utc::now();
        self.store.record_usage(&key.id, now).await?;
        key.usage_count += 1;
        key.monthly_usage += 1;
        key.last_used_at = Some(now);
        Ok(key)
    }

    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
        include_inactive: bool,
    ) -> Result<Vec<ApiKey>, ApiError> {
        self.store.list(limit, offset, include_inactive).await
    }

    pub async fn revoke(&self, id: &str) -> Result<(), ApiError> {
        if !self.store.revoke(id).await? {
            return Err(ApiError::NotFound(format!("API key {} not found", id)));
        }
        tracing::info!(key_id = %id, "API key revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApiKeyScope;

    async fn service() -> (tempfile::TempDir, ApiKeyService) {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::with_path(&dir.path().join("keys.db")).await.unwrap();
        (dir, ApiKeyService::new(store))
    }

    fn request(scopes: Vec<ApiKeyScope>) -> ApiKeyCreate {
        ApiKeyCreate {
            name: "integration".into(),
            scopes,
            rate_limit_per_minute: None,
            monthly_quota: None,
            expires_in_days: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn created_key_resolves_and_counts_usage() {
        let (_dir, service) = service().await;
        let (key, raw) = service
            .create_key(&request(vec![ApiKeyScope::Query, ApiKeyScope::Query]))
            .await
            .unwrap();

        assert!(raw.starts_with(&key.key_prefix));
        assert_eq!(key.scopes, vec![ApiKeyScope::Query]);
        assert_eq!(key.rate_limit_per_minute, 100);

        let resolved = service.resolve(&raw).await.unwrap();
        assert_eq!(resolved.id, key.id);
        assert_eq!(resolved.usage_count, 0);
        assert_eq!(service.resolve(&raw).await.unwrap().usage_count, 0);

        let used = service.record_usage(resolved).await.unwrap();
        assert_eq!(used.usage_count, 1);
        assert_eq!(service.resolve(&raw).await.unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn rejection_reasons() {
        let (_dir, service) = service().await;

        let err = service.resolve("rag_unknown").await.unwrap_err();
        assert_eq!(err.code(), REASON_INVALID_KEY);

        let (key, raw) = service
            .create_key(&request(vec![ApiKeyScope::Query]))
            .await
            .unwrap();
        service.revoke(&key.id).await.unwrap();
        assert_eq!(service.resolve(&raw).await.unwrap_err().code(), REASON_KEY_REVOKED);

        assert!(matches!(
            service.revoke("missing").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn monthly_quota_is_enforced() {
        let (_dir, service) = service().await;
        let mut req = request(vec![ApiKeyScope::Query]);
        req.monthly_quota = Some(2);
        let (_key, raw) = service.create_key(&req).await.unwrap();

        for _ in 0..2 {
            let key = service.resolve(&raw).await.unwrap();
            service.record_usage(key).await.unwrap();
        }
        let err = service.resolve(&raw).await.unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded));
    }

    #[tokio::test]
    async fn invalid_create_request_is_rejected() {
        let (_dir, service) = service().await;
        let mut req = request(vec![ApiKeyScope::Query]);
        req.name = "x".into();
        assert!(matches!(
            service.create_key(&req).await,
            Err(ApiError::Validation(_))
        ));
    }
}
