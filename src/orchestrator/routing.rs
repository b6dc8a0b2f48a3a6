//! Per-question routing between vector retrieval and web search.
//!
//! Keyword heuristics (English and French) decide by default. When enabled,
//! a small model labels the intent first; any failure there falls back to
//! searching everything.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;

use crate::core::config::RoutingConfig;
use crate::llm::{GenerationConfig, LlmGateway};
use crate::models::{Conversation, Intent, RoutingDecision};

const SALUTATION_WORDS: &[&str] = &[
    "hi", "hello", "hey", "yo", "hola", "morning", "afternoon", "evening", "thanks", "thank",
    "bonjour", "bonsoir", "salut", "coucou", "merci",
];

/// Allowed around a salutation ("good morning", "thank you", "salut ça va").
const GREETING_FILLER: &[&str] = &["good", "you", "how", "are", "beaucoup", "ça", "va"];

const FRESHNESS_WORDS: &[&str] = &[
    "today", "tonight", "yesterday", "tomorrow", "latest", "news", "current", "currently",
    "now", "recent", "recently", "price", "prices", "weather", "stock", "score", "trending",
    "actualité", "actualités", "actuel", "actuelle", "actuellement", "récent", "récente",
    "récents", "dernier", "dernière", "dernières", "derniers", "maintenant", "prix", "météo",
    "hier", "demain", "cours",
];

const FRESHNESS_PHRASES: &[&str] = &[
    "this week",
    "this month",
    "this year",
    "right now",
    "aujourd'hui",
    "cette semaine",
    "ce mois",
    "cette année",
    "en ce moment",
];

const PERSONAL_WORDS: &[&str] = &[
    "my", "mine", "myself", "cv", "resume", "résumé", "portfolio", "mon", "ma", "mes",
];

const QUESTION_LEADS: &[&str] = &[
    "what", "who", "when", "where", "how", "why", "which", "define", "explain", "describe",
    "is", "are", "does", "do", "can", "qu", "que", "quel", "quelle", "quels", "quelles", "qui",
    "quand", "où", "comment", "pourquoi", "combien", "définir", "définis", "explique",
    "expliquer", "décris",
];

const FOLLOW_UP_LEADS: &[&str] = &[
    "and", "also", "then", "so", "why", "how", "really", "et", "aussi", "alors", "puis",
    "pourquoi", "comment", "vraiment",
];

const FOLLOW_UP_MAX_WORDS: usize = 4;

static YEAR_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Mentions of the current or a future year (2024 onwards).
fn year_pattern() -> &'static Regex {
    YEAR_PATTERN.get_or_init(|| Regex::new(r"\b20(2[4-9]|[3-9][0-9])\b").expect("Invalid regex"))
}

const INTENT_PROMPT: &str = "Classify the user's message into exactly one label:\n\
factual, web_fresh, personal_knowledge, greeting, unclear.\n\
web_fresh means the answer depends on recent or live information.\n\
personal_knowledge means it asks about the owner's own projects, CV or documents.\n\
Reply with the label only.\n\nMessage: ";

pub struct RoutingClassifier {
    gateway: Option<Arc<LlmGateway>>,
    intent_model: String,
    intent_timeout: Duration,
}

impl RoutingClassifier {
    /// Heuristics only.
    pub fn heuristic() -> Self {
        Self::with_gateway(None, &RoutingConfig::default())
    }

    pub fn from_config(config: &RoutingConfig, gateway: Arc<LlmGateway>) -> Self {
        let gateway = config.llm_intent.then_some(gateway);
        Self::with_gateway(gateway, config)
    }

    fn with_gateway(gateway: Option<Arc<LlmGateway>>, config: &RoutingConfig) -> Self {
        Self {
            gateway,
            intent_model: config.intent_model.clone(),
            intent_timeout: Duration::from_millis(config.intent_timeout_ms),
        }
    }

    /// Never fails: a broken model step degrades to `fail_closed`.
    pub async fn classify(
        &self,
        question: &str,
        recent_history: &[Conversation],
        web_override: Option<bool>,
    ) -> RoutingDecision {
        let decision = match &self.gateway {
            Some(gateway) => self.classify_with_model(gateway, question).await,
            None => self.classify_heuristic(question),
        };

        self.inherit_from_history(decision, question, recent_history)
            .with_web_override(web_override)
    }

    pub fn classify_heuristic(&self, question: &str) -> RoutingDecision {
        let lowered = question.trim().to_lowercase();
        let words = tokenize(&lowered);

        let is_salutation = |w: &String| SALUTATION_WORDS.contains(&w.as_str());
        if words.len() <= 5
            && words.iter().any(is_salutation)
            && words
                .iter()
                .all(|w| is_salutation(w) || GREETING_FILLER.contains(&w.as_str()))
        {
            return RoutingDecision::new(Intent::Greeting, false, false, 0.9);
        }

        let fresh = words.iter().any(|w| FRESHNESS_WORDS.contains(&w.as_str()))
            || FRESHNESS_PHRASES.iter().any(|p| lowered.contains(p))
            || year_pattern().is_match(&lowered);
        if fresh {
            return RoutingDecision::new(Intent::WebFresh, true, true, 0.8);
        }

        if words.iter().any(|w| PERSONAL_WORDS.contains(&w.as_str())) {
            return RoutingDecision::new(Intent::PersonalKnowledge, true, false, 0.8);
        }

        let leads_with_question = words
            .first()
            .map(|w| QUESTION_LEADS.contains(&w.as_str()))
            .unwrap_or(false);
        if leads_with_question || lowered.ends_with('?') {
            return RoutingDecision::new(Intent::Factual, true, false, 0.7);
        }

        RoutingDecision::new(Intent::Unclear, true, false, 0.3)
    }

    async fn classify_with_model(&self, gateway: &LlmGateway, question: &str) -> RoutingDecision {
        let config = GenerationConfig {
            model: self.intent_model.clone(),
            temperature: 0.0,
            max_tokens: 10,
            system_prompt: None,
        };
        let prompt = format!("{}{}", INTENT_PROMPT, question.trim());

        let outcome =
            tokio::time::timeout(self.intent_timeout, gateway.generate(&prompt, &config)).await;
        let label = match outcome {
            Ok(Ok(response)) => response.text,
            Ok(Err(err)) => {
                tracing::warn!(kind = err.kind(), "Intent model failed, routing fail-closed: {}", err);
                return RoutingDecision::fail_closed();
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.intent_timeout.as_millis() as u64,
                    "Intent model timed out, routing fail-closed"
                );
                return RoutingDecision::fail_closed();
            }
        };

        let intent = label
            .split(|c: char| c.is_whitespace() || c == '.' || c == ',')
            .find(|part| !part.is_empty())
            .and_then(Intent::parse);

        match intent {
            Some(Intent::Factual) => RoutingDecision::new(Intent::Factual, true, false, 0.75),
            Some(Intent::WebFresh) => RoutingDecision::new(Intent::WebFresh, true, true, 0.75),
            Some(Intent::PersonalKnowledge) => {
                RoutingDecision::new(Intent::PersonalKnowledge, true, false, 0.75)
            }
            Some(Intent::Greeting) => RoutingDecision::new(Intent::Greeting, false, false, 0.75),
            Some(Intent::Unclear) | None => {
                tracing::debug!(label = %label.trim(), "Intent model gave no usable label, using heuristics");
                self.classify_heuristic(question)
            }
        }
    }

    /// Short follow-ups ("and in 2023?", "why?") keep the web leg on when
    /// the previous turn used it.
    fn inherit_from_history(
        &self,
        mut decision: RoutingDecision,
        question: &str,
        recent_history: &[Conversation],
    ) -> RoutingDecision {
        if decision.use_web || decision.intent == Intent::Greeting {
            return decision;
        }
        let Some(last) = recent_history.last() else {
            return decision;
        };
        if !last.metadata.web_search_used {
            return decision;
        }

        let words = tokenize(&question.trim().to_lowercase());
        let is_follow_up = !words.is_empty()
            && words.len() <= FOLLOW_UP_MAX_WORDS
            && FOLLOW_UP_LEADS.contains(&words[0].as_str());
        if is_follow_up {
            decision.use_web = true;
            decision.use_vector = true;
        }
        decision
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}
