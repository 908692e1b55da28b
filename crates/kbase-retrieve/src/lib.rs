//! kbase retrieve: hybrid retrieval over injected search collaborators.
//!
//! `RetrievalEngine` embeds the query, runs vector and keyword search
//! concurrently and fuses them by weighted sum or reciprocal rank.

pub mod engine;
pub mod fusion;

pub use engine::{RetrievalEngine, SearchMode};
pub use fusion::{fuse_weighted, reciprocal_rank_fusion, FusionStrategy, DEFAULT_RRF_K};
