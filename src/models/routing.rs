use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Factual,
    WebFresh,
    PersonalKnowledge,
    Greeting,
    Unclear,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Factual => "factual",
            Intent::WebFresh => "web_fresh",
            Intent::PersonalKnowledge => "personal_knowledge",
            Intent::Greeting => "greeting",
            Intent::Unclear => "unclear",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "factual" => Some(Intent::Factual),
            "web_fresh" => Some(Intent::WebFresh),
            "personal_knowledge" => Some(Intent::PersonalKnowledge),
            "greeting" => Some(Intent::Greeting),
            "unclear" => Some(Intent::Unclear),
            _ => None,
        }
    }
}

/// Which retrieval legs a query should use. Lives for one request only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: Intent,
    pub use_vector: bool,
    pub use_web: bool,
    pub confidence: f32,
}

impl RoutingDecision {
    pub fn new(intent: Intent, use_vector: bool, use_web: bool, confidence: f32) -> Self {
        Self {
            intent,
            use_vector,
            use_web,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Used whenever classification cannot complete: search everything.
    pub fn fail_closed() -> Self {
        Self::new(Intent::Unclear, true, true, 0.0)
    }

    pub fn with_web_override(mut self, use_web: Option<bool>) -> Self {
        if let Some(use_web) = use_web {
            self.use_web = use_web;
            if use_web && self.intent == Intent::Greeting {
                self.use_vector = true;
            }
        }
        self
    }

    pub fn retrieves_anything(&self) -> bool {
        self.use_vector || self.use_web
    }
}
