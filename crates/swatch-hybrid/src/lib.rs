pub mod orchestrator;
pub mod rerank;

pub use orchestrator::{QueryOptions, QueryOrchestrator};
pub use rerank::{color_similarity, HybridReranker, DEFAULT_ALPHA};
