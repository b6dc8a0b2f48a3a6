use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::validate_config;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 10] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "master_key",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 4] = ["max_tokens", "tokens_input", "tokens_output", "tokens"];

/// Environment variables overlaid on top of the YAML file, as dotted paths.
const ENV_OVERRIDES: [(&str, &str); 8] = [
    ("MISTRAL_API_KEY", "llm.providers.mistral.api_key"),
    ("OPENAI_API_KEY", "llm.providers.openai.api_key"),
    ("DEEPSEEK_API_KEY", "llm.providers.deepseek.api_key"),
    ("EMBEDDING_API_KEY", "embedding.api_key"),
    ("BRAVE_SEARCH_API_KEY", "search.brave_api_key"),
    ("GOOGLE_SEARCH_API_KEY", "search.google_api_key"),
    ("GOOGLE_SEARCH_ENGINE_ID", "search.google_engine_id"),
    ("RAG_MASTER_KEY", "security.master_key"),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        self.paths.config_path.clone()
    }

    /// Raw merged configuration: YAML file, then environment secrets.
    pub fn load_raw(&self) -> Value {
        let file_config = load_yaml_file(&self.config_path());
        let env_config = env_overrides(|name| env::var(name).ok());
        deep_merge(&file_config, &env_config)
    }

    pub fn load_config(&self) -> Result<AppConfig, ApiError> {
        parse_config(&self.load_raw())
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

/// Validates a raw configuration tree and converts it to the typed form.
pub fn parse_config(raw: &Value) -> Result<AppConfig, ApiError> {
    validate_config(raw)?;
    serde_json::from_value(raw.clone())
        .map_err(|e| ApiError::validation(format!("Invalid config: {}", e)))
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => Value::Object(Map::new()),
            Err(err) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn env_overrides<F>(lookup: F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    let mut root = Value::Object(Map::new());
    for (name, path) in ENV_OVERRIDES {
        let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let segments: Vec<&str> = path.split('.').collect();
        insert_at_path(&mut root, &segments, Value::String(value));
    }
    root
}

fn insert_at_path(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for key in parents {
        if !current.get(*key).map(Value::is_object).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }
        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }

    if let Some(map) = current.as_object_mut() {
        map.insert((*last).to_string(), value);
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "llm": { "model": "mistral-large-latest", "max_tokens": 1024 },
            "search": { "provider": "brave" }
        });
        let override_value = json!({
            "llm": { "max_tokens": 2048 },
            "security": { "master_key": "m" }
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "llm": { "model": "mistral-large-latest", "max_tokens": 2048 },
                "search": { "provider": "brave" },
                "security": { "master_key": "m" }
            })
        );
    }

    #[test]
    fn env_overrides_build_nested_paths() {
        let overlay = env_overrides(|name| match name {
            "MISTRAL_API_KEY" => Some("mk".to_string()),
            "RAG_MASTER_KEY" => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(
            overlay,
            json!({ "llm": { "providers": { "mistral": { "api_key": "mk" } } } })
        );
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "llm": {
                "max_tokens": 42,
                "providers": { "openai": { "api_key": "sk", "base_url": "https://x" } }
            },
            "security": { "master_key": "m" },
            "search": { "brave_api_key": null }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "llm": {
                    "max_tokens": 42,
                    "providers": { "openai": { "api_key": "****", "base_url": "https://x" } }
                },
                "security": { "master_key": "****" },
                "search": { "brave_api_key": null }
            })
        );
    }

    #[test]
    fn load_config_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::with_data_dir(dir.path()));
        fs::write(
            &paths.config_path,
            "retrieval:\n  top_k: 4\nsearch:\n  enabled: false\n",
        )
        .unwrap();

        let service = ConfigService::new(paths);
        let config = parse_config(&load_yaml_file(&service.paths().config_path)).unwrap();

        assert_eq!(config.retrieval.top_k, 4);
        assert!(!config.search.enabled);
    }

    #[test]
    fn parse_config_rejects_out_of_range_values() {
        let raw = json!({ "retrieval": { "similarity_threshold": 1.5 } });
        let err = parse_config(&raw).unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg.contains("retrieval.similarity_threshold")));
    }
}
