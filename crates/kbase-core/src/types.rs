//! Data types shared by chunking, retrieval and reranking.

use std::collections::HashMap;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

pub type Metadata = HashMap<String, serde_json::Value>;

/// A bounded slice of a source document.
///
/// `start_index`/`end_index` are byte offsets into the original text and
/// always fall on char boundaries, so `&text[start_index..end_index]` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunk {
    pub content: String,
    pub start_index: usize,
    pub end_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    /// Length of the source text in characters.
    pub original_length: usize,
    pub chunk_count: usize,
}

/// Output of every chunking strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunks: Vec<TextChunk>,
    pub metadata: ChunkStats,
}

impl ChunkResult {
    pub fn new(chunks: Vec<TextChunk>, original_length: usize) -> Self {
        let chunk_count = chunks.len();
        Self {
            chunks,
            metadata: ChunkStats {
                original_length,
                chunk_count,
            },
        }
    }

    pub fn empty(original_length: usize) -> Self {
        Self::new(Vec::new(), original_length)
    }
}

/// Organisation boundary every search and storage call must respect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantScope {
    pub organisation_id: String,
}

impl TenantScope {
    pub fn new(organisation_id: impl Into<String>) -> Self {
        Self {
            organisation_id: organisation_id.into(),
        }
    }
}

/// Filters passed through to the search collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub scope: TenantScope,
    /// Restrict to these documents; empty means all documents in scope.
    #[serde(default)]
    pub document_ids: Vec<String>,
}

impl SearchFilters {
    pub fn for_tenant(organisation_id: impl Into<String>) -> Self {
        Self {
            scope: TenantScope::new(organisation_id),
            document_ids: Vec::new(),
        }
    }

    pub fn with_documents(mut self, document_ids: Vec<String>) -> Self {
        self.document_ids = document_ids;
        self
    }

    pub fn organisation_id(&self) -> &str {
        &self.scope.organisation_id
    }

    pub fn allows_document(&self, document_id: &str) -> bool {
        self.document_ids.is_empty() || self.document_ids.iter().any(|d| d == document_id)
    }
}

/// Which pipeline stage produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStage {
    Semantic,
    Keyword,
    WeightedFusion,
    ReciprocalRankFusion,
    EmbeddingRerank,
    LlmRerank,
}

impl std::fmt::Display for ScoreStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Semantic => write!(f, "semantic"),
            Self::Keyword => write!(f, "keyword"),
            Self::WeightedFusion => write!(f, "weighted_fusion"),
            Self::ReciprocalRankFusion => write!(f, "reciprocal_rank_fusion"),
            Self::EmbeddingRerank => write!(f, "embedding_rerank"),
            Self::LlmRerank => write!(f, "llm_rerank"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageScore {
    pub stage: ScoreStage,
    pub score: f64,
}

/// A persisted chunk reference carrying its relevance history for one query.
///
/// Stages append to `stage_scores`; nothing overwrites an earlier entry.
/// `current_score()` is what the next stage sorts by.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub semantic_score: f64,
    pub keyword_score: f64,
    /// Keyword hit came from the substring fallback, not a full-text rank.
    pub keyword_fallback: bool,
    pub stage_scores: Vec<StageScore>,
    pub metadata: Metadata,
}

impl ScoredChunk {
    pub fn new(id: impl Into<String>, document_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            content: content.into(),
            semantic_score: 0.0,
            keyword_score: 0.0,
            keyword_fallback: false,
            stage_scores: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Build a vector-search hit.
    pub fn semantic_hit(
        id: impl Into<String>,
        document_id: impl Into<String>,
        content: impl Into<String>,
        score: f64,
    ) -> Self {
        let mut chunk = Self::new(id, document_id, content);
        chunk.semantic_score = score;
        chunk.push_score(ScoreStage::Semantic, score);
        chunk
    }

    /// Build a keyword-search hit.
    pub fn keyword_hit(
        id: impl Into<String>,
        document_id: impl Into<String>,
        content: impl Into<String>,
        score: f64,
    ) -> Self {
        let mut chunk = Self::new(id, document_id, content);
        chunk.keyword_score = score;
        chunk.push_score(ScoreStage::Keyword, score);
        chunk
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Most recently recorded score, `0.0` before any stage ran.
    pub fn current_score(&self) -> f64 {
        self.stage_scores.last().map(|s| s.score).unwrap_or(0.0)
    }

    pub fn push_score(&mut self, stage: ScoreStage, score: f64) {
        self.stage_scores.push(StageScore { stage, score });
    }

    /// Latest score recorded by `stage`, if it ran.
    pub fn score_for(&self, stage: ScoreStage) -> Option<f64> {
        self.stage_scores
            .iter()
            .rev()
            .find(|s| s.stage == stage)
            .map(|s| s.score)
    }
}

impl Serialize for ScoredChunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ScoredChunk", 9)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("documentId", &self.document_id)?;
        s.serialize_field("content", &self.content)?;
        s.serialize_field("score", &self.current_score())?;
        s.serialize_field("semanticScore", &self.semantic_score)?;
        s.serialize_field("keywordScore", &self.keyword_score)?;
        s.serialize_field("keywordFallback", &self.keyword_fallback)?;
        s.serialize_field("stageScores", &self.stage_scores)?;
        s.serialize_field("metadata", &self.metadata)?;
        s.end()
    }
}

/// What the retrieval engine hands to the answer synthesizer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub results: Vec<ScoredChunk>,
    pub query: String,
    /// Wall-clock milliseconds, including the query embedding call.
    #[serde(rename = "took")]
    pub took_ms: u64,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
