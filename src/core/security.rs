use axum::http::HeaderMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::core::errors::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const MASTER_KEY_HEADER: &str = "x-master-key";

const KEY_PREFIX: &str = "rag_";
const DISPLAY_PREFIX_LEN: usize = 8;

/// A freshly minted key. `raw` is returned to the caller exactly once.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub raw: String,
    pub hash: String,
    pub display_prefix: String,
}

pub fn generate_api_key() -> GeneratedKey {
    let mut secret = [0u8; 16];
    rand::rng().fill_bytes(&mut secret);
    let raw = format!("{}{}", KEY_PREFIX, hex::encode(secret));
    let display_prefix = raw.chars().take(DISPLAY_PREFIX_LEN).collect();

    GeneratedKey {
        hash: hash_api_key(&raw),
        raw,
        display_prefix,
    }
}

pub fn hash_api_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Reads the presented key. Missing, empty or non-UTF-8 values all count
/// as "no key".
pub fn extract_api_key(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::AuthenticationRequired)
}

/// True when the request carries the configured master key.
pub fn has_master_key(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|value| !value.is_empty()) else {
        return false;
    };
    let Some(presented) = headers
        .get(MASTER_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
