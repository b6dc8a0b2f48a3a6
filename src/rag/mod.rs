//! Retrieval: the vector store boundary and context assembly.

mod context_builder;
mod sqlite;
mod store;

pub use context_builder::{
    estimate_tokens, AssemblerConfig, ChunkOrigin, ContextAssembler, ContextChunk, PromptContext,
};
pub use sqlite::SqliteVectorStore;
pub use store::VectorStore;
