//! Search collaborator contracts.
//!
//! Implementations must scope results to `filters.scope` on their side and
//! return hits sorted by relevance, best first.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ScoredChunk, SearchFilters};

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Nearest chunks to `query_embedding`, carrying `semantic_score`.
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>>;
}

#[async_trait]
pub trait KeywordSearch: Send + Sync {
    /// Full-text matches for `query`, carrying `keyword_score`.
    ///
    /// Hits from a substring fallback set `keyword_fallback`.
    async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>>;
}
