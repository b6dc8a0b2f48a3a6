//! Context assembly.
//!
//! Merges vector hits and web snippets into one ranked, deduplicated,
//! token-bounded list of chunks:
//! 1. Score web snippets by position (vector hits keep their similarity)
//! 2. Sort by relevance, newer first on ties
//! 3. Drop near-duplicates of higher-ranked chunks
//! 4. Greedily fill the token budget, skipping chunks that do not fit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    document::normalize_content, ContextSource, ContextSourceType, DocumentMatch,
    RoutingDecision,
};
use crate::search::WebResult;
use crate::vector_math::{cosine_similarity, text_cosine_similarity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Chunks at least this similar to a kept chunk are dropped.
    pub dedup_threshold: f32,
    /// Relevance of the first web result; later ones decay linearly.
    pub web_base_relevance: f32,
    pub web_position_decay: f32,
    pub preview_chars: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.95,
            web_base_relevance: 0.75,
            web_position_decay: 0.05,
            preview_chars: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOrigin {
    Vector { document_id: String, source: String },
    Web { url: String, title: String },
}

#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub origin: ChunkOrigin,
    pub content: String,
    pub relevance: f32,
    pub embedding: Option<Vec<f32>>,
    pub created_at: Option<DateTime<Utc>>,
    pub tokens: usize,
}

/// What the generator sees, plus bookkeeping about what was left out.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub chunks: Vec<ContextChunk>,
    pub token_estimate: usize,
    pub duplicates_dropped: usize,
    pub over_budget_dropped: usize,
}

impl PromptContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn uses_web(&self) -> bool {
        self.chunks
            .iter()
            .any(|c| matches!(c.origin, ChunkOrigin::Web { .. }))
    }

    /// Numbered context block with citations, e.g.
    /// `[1] (Source: notes, relevance: 0.91)`.
    pub fn render(&self) -> String {
        let mut context = String::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let source = match &chunk.origin {
                ChunkOrigin::Vector { source, .. } => source.as_str(),
                ChunkOrigin::Web { url, .. } => url.as_str(),
            };
            context.push_str(&format!(
                "[{}] (Source: {}, relevance: {:.2})\n{}\n\n",
                i + 1,
                source,
                chunk.relevance,
                chunk.content
            ));
        }
        context.trim().to_string()
    }

    pub fn sources(&self, preview_chars: usize) -> Vec<ContextSource> {
        self.chunks
            .iter()
            .map(|chunk| {
                let content_preview = preview(&chunk.content, preview_chars);
                match &chunk.origin {
                    ChunkOrigin::Vector { document_id, .. } => ContextSource {
                        source_type: ContextSourceType::VectorStore,
                        document_id: Some(document_id.clone()),
                        content_preview,
                        similarity_score: Some(chunk.relevance),
                        url: None,
                    },
                    ChunkOrigin::Web { url, .. } => ContextSource {
                        source_type: ContextSourceType::Web,
                        document_id: None,
                        content_preview,
                        similarity_score: Some(chunk.relevance),
                        url: Some(url.clone()),
                    },
                }
            })
            .collect()
    }
}

/// Rough token count: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

pub struct ContextAssembler {
    config: AssemblerConfig,
}

impl ContextAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Pure function of its inputs. Vector hits are always considered;
    /// web snippets only when the decision enabled the web leg.
    pub fn assemble(
        &self,
        decision: &RoutingDecision,
        question: &str,
        vector_hits: &[DocumentMatch],
        web_snippets: &[WebResult],
        token_budget: usize,
    ) -> PromptContext {
        let question_norm = normalize_content(question).to_lowercase();

        let mut candidates: Vec<ContextChunk> = vector_hits
            .iter()
            .map(|hit| ContextChunk {
                origin: ChunkOrigin::Vector {
                    document_id: hit.document.id.clone(),
                    source: hit
                        .document
                        .metadata
                        .title
                        .clone()
                        .unwrap_or_else(|| {
                            format!("{}:{}", hit.document.source_type, hit.document.source_id)
                        }),
                },
                tokens: estimate_tokens(&hit.document.content),
                content: hit.document.content.clone(),
                relevance: hit.similarity.clamp(0.0, 1.0),
                embedding: hit.document.embedding.clone(),
                created_at: Some(hit.document.metadata.created_at),
            })
            .collect();

        if decision.use_web {
            candidates.extend(
                web_snippets
                    .iter()
                    .enumerate()
                    .filter(|(_, result)| !result.snippet.trim().is_empty())
                    .map(|(position, result)| (position, result, normalize_content(&result.snippet)))
                    // A snippet that only echoes the question adds nothing.
                    .filter(|(_, _, content)| content.to_lowercase() != question_norm)
                    .map(|(position, result, content)| {
                        ContextChunk {
                            origin: ChunkOrigin::Web {
                                url: result.url.clone(),
                                title: result.title.clone(),
                            },
                            tokens: estimate_tokens(&content),
                            content,
                            relevance: self.web_relevance(position),
                            embedding: None,
                            created_at: None,
                        }
                    }),
            );
        }

        candidates.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let mut context = PromptContext::default();
        let mut kept: Vec<ContextChunk> = Vec::new();
        for candidate in candidates {
            if kept.iter().any(|k| self.is_duplicate(k, &candidate)) {
                context.duplicates_dropped += 1;
                continue;
            }
            kept.push(candidate);
        }

        let mut remaining = token_budget;
        for chunk in kept {
            if chunk.tokens <= remaining {
                remaining -= chunk.tokens;
                context.token_estimate += chunk.tokens;
                context.chunks.push(chunk);
            } else {
                context.over_budget_dropped += 1;
            }
        }

        tracing::debug!(
            intent = decision.intent.as_str(),
            chunks = context.chunks.len(),
            tokens = context.token_estimate,
            duplicates = context.duplicates_dropped,
            over_budget = context.over_budget_dropped,
            "Context assembled"
        );

        context
    }

    fn web_relevance(&self, position: usize) -> f32 {
        let decay = 1.0 - self.config.web_position_decay * position as f32;
        (self.config.web_base_relevance * decay).clamp(0.0, 1.0)
    }

    fn is_duplicate(&self, kept: &ContextChunk, candidate: &ContextChunk) -> bool {
        let similarity = match (&kept.embedding, &candidate.embedding) {
            (Some(a), Some(b)) if a.len() == b.len() && !a.is_empty() => cosine_similarity(a, b),
            _ => text_cosine_similarity(&kept.content, &candidate.content),
        };
        similarity >= self.config.dedup_threshold
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Intent, SourceType};
    use chrono::Duration;

    fn hit(content: &str, similarity: f32, embedding: Vec<f32>) -> DocumentMatch {
        DocumentMatch {
            document: Document::new(content, SourceType::Manual, "notes").with_embedding(embedding),
            similarity,
        }
    }

    fn web(snippet: &str, url: &str) -> WebResult {
        WebResult {
            title: url.to_string(),
            snippet: snippet.to_string(),
            url: url.to_string(),
        }
    }

    fn vector_only() -> RoutingDecision {
        RoutingDecision::new(Intent::Factual, true, false, 0.8)
    }

    fn hybrid() -> RoutingDecision {
        RoutingDecision::new(Intent::WebFresh, true, true, 0.8)
    }

    #[test]
    fn orders_by_relevance_and_keeps_citations() {
        let assembler = ContextAssembler::default();
        let hits = vec![
            hit("Second best fact about Rust", 0.8, vec![0.0, 1.0]),
            hit("Best fact about Paris", 0.9, vec![1.0, 0.0]),
        ];

        let context = assembler.assemble(&vector_only(), "q?", &hits, &[], 1000);

        assert_eq!(context.chunks.len(), 2);
        assert_eq!(context.chunks[0].content, "Best fact about Paris");
        assert!(context.render().starts_with("[1] (Source: manual:notes, relevance: 0.90)"));

        let sources = context.sources(200);
        assert_eq!(sources[0].source_type, ContextSourceType::VectorStore);
        assert_eq!(sources[0].similarity_score, Some(0.9));
        assert!(sources[0].similarity_score >= sources[1].similarity_score);
    }

    #[test]
    fn ties_prefer_newer_chunks() {
        let assembler = ContextAssembler::default();
        let mut old = hit("Older statement on the topic", 0.8, vec![1.0, 0.0]);
        old.document.metadata.created_at = Utc::now() - Duration::days(30);
        let new = hit("Newer statement about something", 0.8, vec![0.0, 1.0]);

        let context = assembler.assemble(&vector_only(), "q", &[old, new], &[], 1000);
        assert_eq!(context.chunks[0].content, "Newer statement about something");
    }

    #[test]
    fn drops_near_duplicates_by_embedding() {
        let assembler = ContextAssembler::default();
        let hits = vec![
            hit("Paris is the capital", 0.9, vec![1.0, 0.0]),
            hit("The capital is Paris indeed", 0.85, vec![0.99, 0.01]),
        ];

        let context = assembler.assemble(&vector_only(), "q", &hits, &[], 1000);
        assert_eq!(context.chunks.len(), 1);
        assert_eq!(context.duplicates_dropped, 1);
    }

    #[test]
    fn drops_near_duplicates_by_text_when_embeddings_missing() {
        let assembler = ContextAssembler::default();
        let hits = vec![hit("Paris is the capital of France", 0.9, vec![1.0, 0.0])];
        let snippets = vec![web("Paris is the capital of France.", "https://example.com")];

        let context = assembler.assemble(&hybrid(), "q", &hits, &snippets, 1000);
        assert_eq!(context.chunks.len(), 1);
        assert!(!context.uses_web());
    }

    #[test]
    fn skips_chunks_that_do_not_fit_but_keeps_smaller_ones() {
        let assembler = ContextAssembler::default();
        let big = "x".repeat(400);
        let hits = vec![
            hit(&big, 0.95, vec![1.0, 0.0]),
            hit("short relevant note", 0.8, vec![0.0, 1.0]),
        ];

        let context = assembler.assemble(&vector_only(), "q", &hits, &[], 20);
        assert_eq!(context.chunks.len(), 1);
        assert_eq!(context.chunks[0].content, "short relevant note");
        assert_eq!(context.over_budget_dropped, 1);
        assert!(context.token_estimate <= 20);
    }

    #[test]
    fn never_empty_when_a_vector_hit_fits() {
        let assembler = ContextAssembler::default();
        let hits = vec![hit("tiny", 0.71, vec![1.0])];

        let context = assembler.assemble(&vector_only(), "q", &hits, &[], estimate_tokens("tiny"));
        assert!(!context.is_empty());

        let greeting = RoutingDecision::new(Intent::Greeting, false, false, 0.9);
        assert!(!assembler.assemble(&greeting, "q", &hits, &[], 10).is_empty());
    }

    #[test]
    fn stored_document_matching_the_question_is_kept() {
        let assembler = ContextAssembler::default();
        let question = "What is the capital of France?";
        let hits = vec![DocumentMatch {
            document: Document::new(question, SourceType::Manual, "faq"),
            similarity: 0.9,
        }];
        let snippets = vec![web(question, "https://echo.example")];

        let context = assembler.assemble(&hybrid(), question, &hits, &snippets, 1000);
        assert_eq!(context.chunks.len(), 1);
        assert!(matches!(context.chunks[0].origin, ChunkOrigin::Vector { .. }));
    }

    #[test]
    fn web_snippets_decay_by_position_and_respect_decision() {
        let assembler = ContextAssembler::default();
        let snippets = vec![
            web("first web snippet about news", "https://a.example"),
            web("second snippet on another matter", "https://b.example"),
        ];

        let context = assembler.assemble(&hybrid(), "q", &[], &snippets, 1000);
        assert_eq!(context.chunks.len(), 2);
        assert!((context.chunks[0].relevance - 0.75).abs() < 1e-6);
        assert!((context.chunks[1].relevance - 0.7125).abs() < 1e-6);
        assert_eq!(context.sources(200)[0].url.as_deref(), Some("https://a.example"));

        let ignored = assembler.assemble(&vector_only(), "q", &[], &snippets, 1000);
        assert!(ignored.is_empty());
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "word ".repeat(100);
        let p = preview(&long, 20);
        assert!(p.ends_with("..."));
        assert!(p.chars().count() <= 23);
    }
}
