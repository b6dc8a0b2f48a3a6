//! Query orchestration: routing, retrieval, assembly, generation and
//! persistence of one question.

pub mod pipeline;
pub mod routing;
pub mod types;

pub use pipeline::{assembler_config, build_prompt, OrchestratorSettings, QueryOrchestrator};
pub use routing::RoutingClassifier;
pub use types::{QueryMetadata, QueryRequest, QueryResponse, QueryStage};
