//! Retrieval engine: embeds the query once and fans out to the injected
//! search collaborators.
//!
//! The engine holds no per-call state; one instance serves concurrent
//! requests.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kbase_core::deadline::{bounded, DEFAULT_CALL_TIMEOUT};
use kbase_core::scoring::sort_by_score_desc;
use kbase_core::{
    Error, KeywordSearch, Result, RetrievalResult, RetrievalWeights, ScoreStage, ScoredChunk,
    SearchFilters, VectorSearch,
};
use kbase_infer::Embedder;

use crate::fusion::{ensure_stage, fuse_weighted, reciprocal_rank_fusion, FusionStrategy};

/// Which searches a query runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Vector + keyword, fused.
    #[default]
    Hybrid,
    /// Vector search only.
    Semantic,
    /// Keyword search only.
    Keyword,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "semantic" | "vector" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            other => Err(Error::InvalidInput(format!("unknown search mode: {other}"))),
        }
    }
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    weights: RetrievalWeights,
    fusion: FusionStrategy,
    timeout: Duration,
}

impl RetrievalEngine {
    /// Rejects malformed weights up front.
    pub fn new(embedder: Arc<dyn Embedder>, weights: RetrievalWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self {
            embedder,
            weights,
            fusion: FusionStrategy::default(),
            timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_fusion(mut self, fusion: FusionStrategy) -> Self {
        self.fusion = fusion;
        self
    }

    /// Bound applied to each embedding and search call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn weights(&self) -> &RetrievalWeights {
        &self.weights
    }

    pub fn fusion(&self) -> FusionStrategy {
        self.fusion
    }

    /// Dispatch on `mode`. Single modes never touch the unused collaborator.
    pub async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        vector: &dyn VectorSearch,
        keyword: &dyn KeywordSearch,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<RetrievalResult> {
        match mode {
            SearchMode::Hybrid => self.hybrid_search(query, vector, keyword, limit, filters).await,
            SearchMode::Semantic => self.semantic_search(query, vector, limit, filters).await,
            SearchMode::Keyword => self.keyword_only_search(query, keyword, limit, filters).await,
        }
    }

    /// Embed once, query both collaborators concurrently at `2 * limit`,
    /// then fuse and truncate to `limit`.
    ///
    /// Either search failing fails the whole call.
    pub async fn hybrid_search(
        &self,
        query: &str,
        vector: &dyn VectorSearch,
        keyword: &dyn KeywordSearch,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<RetrievalResult> {
        let start = Instant::now();
        check_query(query)?;
        if limit == 0 {
            return Ok(finish(query, Vec::new(), start));
        }

        let embedding = self.embed_query(query).await?;
        let fetch = limit.saturating_mul(2);

        let (semantic, lexical) = tokio::try_join!(
            bounded(
                "vector search",
                self.timeout,
                vector.vector_search(&embedding, fetch, filters)
            ),
            bounded(
                "keyword search",
                self.timeout,
                keyword.keyword_search(query, fetch, filters)
            ),
        )?;

        debug!(
            semantic = semantic.len(),
            keyword = lexical.len(),
            fetch,
            "hybrid candidates"
        );

        let results = match self.fusion {
            FusionStrategy::Weighted => fuse_weighted(semantic, lexical, &self.weights, limit),
            FusionStrategy::ReciprocalRank { k } => {
                let semantic = semantic
                    .into_iter()
                    .map(|h| ensure_stage(h, ScoreStage::Semantic))
                    .collect();
                let lexical = lexical
                    .into_iter()
                    .map(|h| ensure_stage(h, ScoreStage::Keyword))
                    .collect();
                let mut fused = reciprocal_rank_fusion(vec![semantic, lexical], k);
                fused.truncate(limit);
                fused
            }
        };

        let result = finish(query, results, start);
        info!(
            "Hybrid search returned {} results in {}ms ({:?})",
            result.results.len(),
            result.took_ms,
            self.fusion
        );
        Ok(result)
    }

    /// Vector search only; `keyword_score` is zeroed.
    pub async fn semantic_search(
        &self,
        query: &str,
        vector: &dyn VectorSearch,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<RetrievalResult> {
        let start = Instant::now();
        check_query(query)?;
        if limit == 0 {
            return Ok(finish(query, Vec::new(), start));
        }

        let embedding = self.embed_query(query).await?;
        let hits = bounded(
            "vector search",
            self.timeout,
            vector.vector_search(&embedding, limit, filters),
        )
        .await?;

        let mut results: Vec<ScoredChunk> = hits
            .into_iter()
            .map(|hit| {
                let mut hit = ensure_stage(hit, ScoreStage::Semantic);
                hit.keyword_score = 0.0;
                hit.keyword_fallback = false;
                hit
            })
            .collect();
        sort_by_score_desc(&mut results);
        results.truncate(limit);

        let result = finish(query, results, start);
        debug!(results = result.results.len(), took_ms = result.took_ms, "semantic search");
        Ok(result)
    }

    /// Keyword search only; `semantic_score` is zeroed. No embedding call.
    pub async fn keyword_only_search(
        &self,
        query: &str,
        keyword: &dyn KeywordSearch,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<RetrievalResult> {
        let start = Instant::now();
        check_query(query)?;
        if limit == 0 {
            return Ok(finish(query, Vec::new(), start));
        }

        let hits = bounded(
            "keyword search",
            self.timeout,
            keyword.keyword_search(query, limit, filters),
        )
        .await?;

        let mut results: Vec<ScoredChunk> = hits
            .into_iter()
            .map(|hit| {
                let mut hit = ensure_stage(hit, ScoreStage::Keyword);
                hit.semantic_score = 0.0;
                hit
            })
            .collect();
        sort_by_score_desc(&mut results);
        results.truncate(limit);

        let result = finish(query, results, start);
        debug!(results = result.results.len(), took_ms = result.took_ms, "keyword search");
        Ok(result)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedding = bounded("query embedding", self.timeout, self.embedder.embed(query)).await?;
        Ok(embedding.embedding)
    }
}

fn check_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::InvalidInput("query must not be empty".into()));
    }
    Ok(())
}

fn finish(query: &str, results: Vec<ScoredChunk>, start: Instant) -> RetrievalResult {
    RetrievalResult {
        results,
        query: query.to_string(),
        took_ms: start.elapsed().as_millis() as u64,
    }
}
