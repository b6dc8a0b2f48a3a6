use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Github,
    Pdf,
    Linkedin,
    Manual,
    Conversation,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Github => "github",
            SourceType::Pdf => "pdf",
            SourceType::Linkedin => "linkedin",
            SourceType::Manual => "manual",
            SourceType::Conversation => "conversation",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "github" => Ok(SourceType::Github),
            "pdf" => Ok(SourceType::Pdf),
            "linkedin" => Ok(SourceType::Linkedin),
            "manual" => Ok(SourceType::Manual),
            "conversation" => Ok(SourceType::Conversation),
            other => Err(format!("unknown source type '{}'", other)),
        }
    }
}

fn default_language() -> String {
    "fr".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            tags: Vec::new(),
            language: default_language(),
            created_at: Utc::now(),
        }
    }
}

/// A unit of retrievable knowledge.
///
/// The id is derived from the normalized content, so the same text always
/// lands on the same row and re-ingestion becomes an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub source_type: SourceType,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: &str, source_type: SourceType, source_id: impl Into<String>) -> Self {
        let content = normalize_content(content);
        Self {
            id: content_id(&content),
            content,
            source_type,
            source_id: source_id.into(),
            embedding: None,
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_content(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable id for a piece of content: SHA-256 of its normalized form.
pub fn content_id(text: &str) -> String {
    let normalized = normalize_content(text);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// A search hit. `similarity` is clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMatch {
    pub document: Document,
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_content("  Rust\n\n is \t fast  "),
            "Rust is fast"
        );
    }

    #[test]
    fn content_id_ignores_whitespace_differences() {
        assert_eq!(content_id("a  b\nc"), content_id("a b c"));
        assert_ne!(content_id("a b c"), content_id("a b d"));
    }

    #[test]
    fn new_document_is_normalized_and_keyed_by_content() {
        let doc = Document::new(" hello   world ", SourceType::Manual, "notes");

        assert_eq!(doc.content, "hello world");
        assert_eq!(doc.id, content_id("hello world"));
        assert_eq!(doc.metadata.language, "fr");
        assert!(doc.metadata.tags.is_empty());
        assert!(doc.embedding.is_none());
    }

    #[test]
    fn source_type_round_trips_through_str() {
        for source in [
            SourceType::Github,
            SourceType::Pdf,
            SourceType::Linkedin,
            SourceType::Manual,
            SourceType::Conversation,
        ] {
            assert_eq!(source.as_str().parse::<SourceType>().unwrap(), source);
        }
        assert!("web".parse::<SourceType>().is_err());
    }
}
