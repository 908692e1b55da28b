//! kbase rerank: second-pass refinement of a fused candidate list.
//!
//! Each operation is a standalone transform over `Vec<ScoredChunk>`;
//! `RerankPipeline` runs a caller-chosen sequence of them.

pub mod embedding;
pub mod filter;
pub mod llm;
pub mod pipeline;
pub mod types;

pub use embedding::rerank_by_embedding;
pub use filter::{deduplicate, filter_by_keywords, keyword_coverage};
pub use llm::rerank_by_llm;
pub use pipeline::RerankPipeline;
pub use types::*;
