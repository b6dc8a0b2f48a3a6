use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::history::ConversationStore;
use crate::models::{FeedbackFlag, FeedbackRequest};

#[derive(Clone)]
pub struct FeedbackService {
    conversations: Arc<dyn ConversationStore>,
}

impl FeedbackService {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self { conversations }
    }

    /// Stores the feedback, replacing any earlier one for the conversation.
    pub async fn submit(&self, request: &FeedbackRequest) -> Result<FeedbackFlag, ApiError> {
        request.validate()?;
        let flag = request.to_flag();

        if self
            .conversations
            .get_by_id(&flag.conversation_id)
            .await?
            .is_none()
        {
            return Err(ApiError::NotFound(format!(
                "Conversation {} not found",
                flag.conversation_id
            )));
        }

        self.conversations.upsert_feedback(&flag).await?;
        tracing::info!(
            conversation_id = %flag.conversation_id,
            score = flag.score,
            flag_type = flag.flag_type.as_str(),
            "Feedback recorded"
        );
        Ok(flag)
    }
}
