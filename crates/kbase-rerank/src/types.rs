//! Rerank types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use kbase_core::{Error, Result};

pub const DEFAULT_EMBEDDING_TOP_K: usize = 50;
/// LLM rerank never sends more than this many candidates.
pub const MAX_LLM_CANDIDATES: usize = 20;
pub const DEFAULT_MIN_KEYWORD_SCORE: f64 = 0.3;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Pipeline stages that can be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStage {
    #[serde(alias = "dedup")]
    Deduplicate,
    #[serde(alias = "keyword")]
    KeywordFilter,
    #[serde(alias = "embedding")]
    EmbeddingRerank,
    #[serde(alias = "llm")]
    LlmRerank,
}

impl RerankStage {
    /// Cheap filters first, LLM last.
    pub fn all() -> &'static [RerankStage] {
        &[
            Self::Deduplicate,
            Self::KeywordFilter,
            Self::EmbeddingRerank,
            Self::LlmRerank,
        ]
    }

    /// Parse a comma-separated list such as `"dedup,keyword,llm"`.
    pub fn parse_list(list: &str) -> Result<Vec<RerankStage>> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Deduplicate => "dedup",
            Self::KeywordFilter => "keyword",
            Self::EmbeddingRerank => "embedding",
            Self::LlmRerank => "llm",
        }
    }
}

impl FromStr for RerankStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dedup" | "deduplicate" => Ok(Self::Deduplicate),
            "keyword" | "keyword_filter" => Ok(Self::KeywordFilter),
            "embedding" | "embedding_rerank" => Ok(Self::EmbeddingRerank),
            "llm" | "llm_rerank" => Ok(Self::LlmRerank),
            other => Err(Error::InvalidInput(format!("unknown rerank stage: {other}"))),
        }
    }
}

impl std::fmt::Display for RerankStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables shared by all stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RerankOptions {
    pub embedding_top_k: usize,
    /// Capped at [`MAX_LLM_CANDIDATES`].
    pub llm_top_k: usize,
    pub min_keyword_score: f64,
    pub similarity_threshold: f64,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            embedding_top_k: DEFAULT_EMBEDDING_TOP_K,
            llm_top_k: MAX_LLM_CANDIDATES,
            min_keyword_score: DEFAULT_MIN_KEYWORD_SCORE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Output of the embedding rerank.
#[derive(Debug, Clone)]
pub struct EmbeddingRerank {
    pub results: Vec<kbase_core::ScoredChunk>,
    /// Candidate ids as they arrived, for measuring rank displacement.
    pub original_order: Vec<String>,
}

/// Output of the LLM rerank. `degraded` means the input order came back.
#[derive(Debug, Clone)]
pub struct LlmRerank {
    pub results: Vec<kbase_core::ScoredChunk>,
    pub degraded: bool,
}

/// One executed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: RerankStage,
    pub input: usize,
    pub output: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_order: Option<Vec<String>>,
}

/// Result of running the rerank pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn stage_order(&self) -> Vec<RerankStage> {
        self.stages.iter().map(|s| s.stage).collect()
    }
}
