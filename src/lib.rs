pub mod core;
pub mod db;
pub mod embedding;
pub mod feedback;
pub mod history;
pub mod ingest;
pub mod keys;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rag;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod state;
pub mod vector_math;

#[cfg(test)]
pub(crate) mod testing;
