//! User feedback and the loop that feeds good answers back into retrieval.

pub mod service;
pub mod training;

pub use service::FeedbackService;
pub use training::{TrainingPipeline, TrainingReport};
