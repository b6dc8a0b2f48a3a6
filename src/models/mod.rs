pub mod api_key;
pub mod conversation;
pub mod document;
pub mod feedback;
pub mod routing;

pub use api_key::{ApiKey, ApiKeyCreate, ApiKeyScope};
pub use conversation::{ContextSource, ContextSourceType, Conversation, ConversationMetadata};
pub use document::{
    content_id, normalize_content, Document, DocumentMatch, DocumentMetadata, SourceType,
};
pub use feedback::{FeedbackFlag, FeedbackRequest, FlagType};
pub use routing::{Intent, RoutingDecision};
