//! Web search client.
//!
//! Brave and Google need API keys; DuckDuckGo's instant-answer API is the
//! keyless fallback.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::config::SearchConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{provider} search request failed: {message}")]
    Request { provider: &'static str, message: String },
    #[error("{provider} search failed with status {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("{provider} search timed out")]
    Timeout { provider: &'static str },
}

#[async_trait]
pub trait WebSearchClient: Send + Sync {
    fn provider(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<WebResult>, SearchError>;
}

#[derive(Debug, Clone)]
enum SearchProvider {
    Brave { api_key: String },
    Google { api_key: String, engine_id: String },
    DuckDuckGo,
}

pub struct HttpWebSearchClient {
    provider: SearchProvider,
    max_results: usize,
    client: Client,
}

impl HttpWebSearchClient {
    /// Picks the configured provider, falling back to DuckDuckGo when its
    /// credentials are missing.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let provider = match config.provider.as_str() {
            "brave" => match non_empty(&config.brave_api_key) {
                Some(api_key) => SearchProvider::Brave { api_key },
                None => {
                    tracing::warn!("Brave search selected without an API key; using DuckDuckGo");
                    SearchProvider::DuckDuckGo
                }
            },
            "google" => match (
                non_empty(&config.google_api_key),
                non_empty(&config.google_engine_id),
            ) {
                (Some(api_key), Some(engine_id)) => SearchProvider::Google { api_key, engine_id },
                _ => {
                    tracing::warn!(
                        "Google search selected without key or engine id; using DuckDuckGo"
                    );
                    SearchProvider::DuckDuckGo
                }
            },
            _ => SearchProvider::DuckDuckGo,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::Request {
                provider: "http",
                message: e.to_string(),
            })?;

        Ok(Self {
            provider,
            max_results: config.max_results.max(1),
            client,
        })
    }

    fn provider_name(&self) -> &'static str {
        match self.provider {
            SearchProvider::Brave { .. } => "brave",
            SearchProvider::Google { .. } => "google",
            SearchProvider::DuckDuckGo => "duckduckgo",
        }
    }

    async fn get_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, SearchError> {
        let provider = self.provider_name();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout { provider }
            } else {
                SearchError::Request {
                    provider,
                    message: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(SearchError::Status {
                provider,
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| SearchError::Request {
            provider,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl WebSearchClient for HttpWebSearchClient {
    fn provider(&self) -> &str {
        self.provider_name()
    }

    async fn search(&self, query: &str) -> Result<Vec<WebResult>, SearchError> {
        let encoded = urlencoding::encode(query);
        let mut results = match &self.provider {
            SearchProvider::Brave { api_key } => {
                let url = format!(
                    "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
                    encoded, self.max_results
                );
                let request = self
                    .client
                    .get(url)
                    .header("X-Subscription-Token", api_key)
                    .header("Accept", "application/json");
                parse_brave(&self.get_json(request).await?)
            }
            SearchProvider::Google { api_key, engine_id } => {
                let url = format!(
                    "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}",
                    api_key, engine_id, encoded
                );
                parse_google(&self.get_json(self.client.get(url)).await?)
            }
            SearchProvider::DuckDuckGo => {
                let url = format!(
                    "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
                    encoded
                );
                parse_duckduckgo(&self.get_json(self.client.get(url)).await?)
            }
        };

        results.truncate(self.max_results);
        Ok(results)
    }
}

fn str_field<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn push_result(results: &mut Vec<WebResult>, title: &str, url: &str, snippet: &str) {
    if !title.is_empty() && !url.is_empty() {
        results.push(WebResult {
            title: title.to_string(),
            snippet: snippet.to_string(),
            url: url.to_string(),
        });
    }
}

fn parse_brave(payload: &Value) -> Vec<WebResult> {
    let mut results = Vec::new();
    if let Some(items) = payload
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|v| v.as_array())
    {
        for item in items {
            push_result(
                &mut results,
                str_field(item, "title"),
                str_field(item, "url"),
                str_field(item, "description"),
            );
        }
    }
    results
}

fn parse_google(payload: &Value) -> Vec<WebResult> {
    let mut results = Vec::new();
    if let Some(items) = payload.get("items").and_then(|v| v.as_array()) {
        for item in items {
            push_result(
                &mut results,
                str_field(item, "title"),
                str_field(item, "link"),
                str_field(item, "snippet"),
            );
        }
    }
    results
}

fn parse_duckduckgo(payload: &Value) -> Vec<WebResult> {
    let mut results = Vec::new();

    let abstract_text = str_field(payload, "AbstractText");
    let abstract_url = str_field(payload, "AbstractURL");
    if !abstract_text.is_empty() {
        let heading = str_field(payload, "Heading");
        let title = if heading.is_empty() {
            abstract_text.split(" - ").next().unwrap_or(abstract_text)
        } else {
            heading
        };
        push_result(&mut results, title, abstract_url, abstract_text);
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    results
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<WebResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = str_field(item, "Text");
        let url = str_field(item, "FirstURL");
        let title = text.split(" - ").next().unwrap_or(text);
        push_result(results, title, url, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_brave_results_and_skips_incomplete_items() {
        let payload = json!({
            "web": { "results": [
                { "title": "Rust", "url": "https://rust-lang.org", "description": "A language" },
                { "title": "", "url": "https://example.com", "description": "untitled" }
            ]}
        });
        assert_eq!(
            parse_brave(&payload),
            vec![WebResult {
                title: "Rust".into(),
                snippet: "A language".into(),
                url: "https://rust-lang.org".into(),
            }]
        );
    }

    #[test]
    fn parses_google_items() {
        let payload = json!({
            "items": [{ "title": "Tokio", "link": "https://tokio.rs", "snippet": "Async runtime" }]
        });
        let results = parse_google(&payload);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://tokio.rs");
    }

    #[test]
    fn parses_duckduckgo_abstract_and_nested_topics() {
        let payload = json!({
            "Heading": "Paris",
            "AbstractText": "Paris is the capital of France.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Paris",
            "RelatedTopics": [
                { "Text": "Louvre - museum", "FirstURL": "https://duckduckgo.com/Louvre" },
                { "Topics": [
                    { "Text": "Seine - river", "FirstURL": "https://duckduckgo.com/Seine" }
                ]}
            ]
        });

        let results = parse_duckduckgo(&payload);
        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Paris", "Louvre", "Seine"]);
    }

    #[test]
    fn missing_credentials_fall_back_to_duckduckgo() {
        let config = SearchConfig {
            provider: "brave".into(),
            ..SearchConfig::default()
        };
        let client = HttpWebSearchClient::from_config(&config).unwrap();
        assert_eq!(client.provider(), "duckduckgo");

        let config = SearchConfig {
            provider: "brave".into(),
            brave_api_key: Some("key".into()),
            ..SearchConfig::default()
        };
        let client = HttpWebSearchClient::from_config(&config).unwrap();
        assert_eq!(client.provider(), "brave");
    }
}
