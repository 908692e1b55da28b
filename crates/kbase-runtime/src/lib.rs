//! Runtime orchestrator: the verbs the HTTP layer exposes.
//!
//! ingest (chunk → embed → replace chunks), search (retrieve → rerank
//! pipeline) and ask (search → synthesize).

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::*;
