use serde_json::{Map, Value};

use crate::core::errors::ApiError;

const SEARCH_PROVIDERS: [&str; 3] = ["brave", "google", "duckduckgo"];

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 8_192)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 600)?;
        validate_u64_field(llm, "llm.max_attempts", "max_attempts", 1, 10)?;
        validate_u64_field(
            llm,
            "llm.retry_base_delay_ms",
            "retry_base_delay_ms",
            0,
            60_000,
        )?;
        validate_optional_string_field(llm, "llm.system_prompt", "system_prompt")?;
        if let Some(providers) = expect_optional_object(llm, "providers")? {
            for (name, value) in providers {
                let path_prefix = format!("llm.providers.{}", name);
                let entry = value
                    .as_object()
                    .ok_or_else(|| config_type_error(&path_prefix, "object"))?;
                validate_optional_string_field(
                    entry,
                    &format!("{}.base_url", path_prefix),
                    "base_url",
                )?;
                validate_optional_string_field(
                    entry,
                    &format!("{}.api_key", path_prefix),
                    "api_key",
                )?;
            }
        }
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 65_536)?;
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 600)?;
        validate_u64_field(embedding, "embedding.max_retries", "max_retries", 0, 10)?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
        validate_f64_field(
            retrieval,
            "retrieval.similarity_threshold",
            "similarity_threshold",
            0.0,
            1.0,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.context_token_budget",
            "context_token_budget",
            1,
            1_000_000,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.vector_timeout_ms",
            "vector_timeout_ms",
            1,
            600_000,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.web_timeout_ms",
            "web_timeout_ms",
            1,
            600_000,
        )?;
        validate_f64_field(
            retrieval,
            "retrieval.dedup_threshold",
            "dedup_threshold",
            0.0,
            1.0,
        )?;
        validate_f64_field(
            retrieval,
            "retrieval.web_base_relevance",
            "web_base_relevance",
            0.0,
            1.0,
        )?;
        validate_u64_field(retrieval, "retrieval.history_turns", "history_turns", 0, 50)?;
    }

    if let Some(routing) = expect_optional_object(root, "routing")? {
        validate_bool_field(routing, "routing.llm_intent", "llm_intent")?;
        validate_optional_string_field(routing, "routing.intent_model", "intent_model")?;
        validate_u64_field(
            routing,
            "routing.intent_timeout_ms",
            "intent_timeout_ms",
            1,
            60_000,
        )?;
    }

    if let Some(search) = expect_optional_object(root, "search")? {
        validate_bool_field(search, "search.enabled", "enabled")?;
        validate_enum_field(search, "search.provider", "provider", &SEARCH_PROVIDERS)?;
        validate_u64_field(search, "search.max_results", "max_results", 1, 50)?;
        validate_u64_field(search, "search.timeout_secs", "timeout_secs", 1, 120)?;
    }

    if let Some(rate_limit) = expect_optional_object(root, "rate_limit")? {
        validate_u64_field(
            rate_limit,
            "rate_limit.default_per_minute",
            "default_per_minute",
            1,
            10_000,
        )?;
        validate_u64_field(rate_limit, "rate_limit.prune_every", "prune_every", 1, 1_000_000)?;
    }

    if let Some(training) = expect_optional_object(root, "training")? {
        validate_u64_field(training, "training.batch_limit", "batch_limit", 1, 10_000)?;
        validate_u64_field(training, "training.interval_secs", "interval_secs", 1, 86_400)?;
        validate_u64_field(
            training,
            "training.error_backoff_secs",
            "error_backoff_secs",
            1,
            86_400,
        )?;
    }

    if let Some(ingest) = expect_optional_object(root, "ingest")? {
        validate_u64_field(ingest, "ingest.max_chunk_chars", "max_chunk_chars", 100, 100_000)?;
    }

    if let Some(security) = expect_optional_object(root, "security")? {
        validate_optional_string_field(security, "security.master_key", "master_key")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(range_error(path, min, max));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !allowed.contains(&text) {
        return Err(ApiError::validation(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            allowed.join(", ")
        )));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::validation(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn range_error<T: std::fmt::Display>(path: &str, min: T, max: T) -> ApiError {
    ApiError::validation(format!(
        "Invalid config at '{}': must be between {} and {}",
        path, min, max
    ))
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::validation(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
