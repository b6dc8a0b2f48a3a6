use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    Excellent,
    ToVectorize,
    Incorrect,
    Neutral,
}

impl FlagType {
    /// An explicit training request wins; otherwise the score decides.
    pub fn classify(score: u8, flag_for_training: bool) -> Self {
        if flag_for_training {
            FlagType::ToVectorize
        } else if score >= 5 {
            FlagType::Excellent
        } else if score <= 2 {
            FlagType::Incorrect
        } else {
            FlagType::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::Excellent => "excellent",
            FlagType::ToVectorize => "to_vectorize",
            FlagType::Incorrect => "incorrect",
            FlagType::Neutral => "neutral",
        }
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "excellent" => Ok(FlagType::Excellent),
            "to_vectorize" => Ok(FlagType::ToVectorize),
            "incorrect" => Ok(FlagType::Incorrect),
            "neutral" => Ok(FlagType::Neutral),
            other => Err(format!("unknown flag type '{}'", other)),
        }
    }
}

/// The single active feedback record of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackFlag {
    pub conversation_id: String,
    pub score: u8,
    pub comment: Option<String>,
    pub flag_type: FlagType,
    pub created_at: DateTime<Utc>,
}

pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 5;
const MAX_COMMENT_CHARS: usize = 2_000;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub conversation_id: String,
    /// Signed so out-of-range values reach `validate` instead of failing
    /// deserialization with a generic message.
    pub score: i64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub flag_for_training: bool,
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if uuid::Uuid::parse_str(self.conversation_id.trim()).is_err() {
            return Err(ApiError::validation(
                "conversation_id must be a valid UUID",
            ));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&self.score) {
            return Err(ApiError::validation(format!(
                "score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }
        if let Some(comment) = &self.comment {
            if comment.chars().count() > MAX_COMMENT_CHARS {
                return Err(ApiError::validation(format!(
                    "comment must be at most {} characters",
                    MAX_COMMENT_CHARS
                )));
            }
        }
        Ok(())
    }

    /// Builds the record to store. Call `validate` first.
    pub fn to_flag(&self) -> FeedbackFlag {
        let score = self.score.clamp(MIN_SCORE, MAX_SCORE) as u8;
        FeedbackFlag {
            conversation_id: self.conversation_id.trim().to_string(),
            score,
            comment: self
                .comment
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            flag_type: FlagType::classify(score, self.flag_for_training),
            created_at: Utc::now(),
        }
    }
}
