//! Runtime request and response types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use kbase_chat::Answer;
use kbase_chunk::ChunkStrategy;
use kbase_core::deadline::DEFAULT_CALL_TIMEOUT;
use kbase_core::{ChunkingOptions, Error, KbaseConfig, Metadata, Result, RetrievalResult, RetrievalWeights};
use kbase_rerank::{PipelineReport, RerankOptions, RerankStage};
use kbase_retrieve::{FusionStrategy, SearchMode};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub chunking: ChunkingOptions,
    pub weights: RetrievalWeights,
    pub fusion: FusionStrategy,
    /// Run after every search unless the request names its own stages.
    pub rerank_stages: Vec<RerankStage>,
    pub rerank: RerankOptions,
    pub call_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            weights: RetrievalWeights::default(),
            fusion: FusionStrategy::default(),
            rerank_stages: vec![RerankStage::Deduplicate],
            rerank: RerankOptions::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &KbaseConfig) -> Result<Self> {
        let rerank_stages = config
            .rerank_stages
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<RerankStage>>>()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            chunking: config.chunking.clone(),
            weights: config.weights,
            rerank_stages,
            call_timeout: config.call_timeout(),
            ..Self::default()
        })
    }
}

/// A document to (re-)index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub strategy: ChunkStrategy,
    /// Picks chunk size presets, e.g. `"md"` or `".rs"`.
    #[serde(default)]
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Chunks were replaced.
    Indexed,
    /// Content hash matched; nothing written.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub document_id: String,
    pub status: IngestStatus,
    pub chunk_count: usize,
    pub total_tokens: usize,
    pub took_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub document_ids: Vec<String>,
    /// Overrides the configured rerank stages for this request.
    #[serde(default)]
    pub rerank: Option<Vec<RerankStage>>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::default(),
            limit: DEFAULT_SEARCH_LIMIT,
            document_ids: Vec::new(),
            rerank: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(flatten)]
    pub retrieval: RetrievalResult,
    pub mode: SearchMode,
    pub pipeline: PipelineReport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub document_ids: Vec<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            mode: SearchMode::default(),
            limit: DEFAULT_SEARCH_LIMIT,
            document_ids: Vec::new(),
        }
    }

    pub(crate) fn as_search(&self) -> SearchRequest {
        SearchRequest {
            query: self.question.clone(),
            mode: self.mode,
            limit: self.limit,
            document_ids: self.document_ids.clone(),
            rerank: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    #[serde(flatten)]
    pub answer: Answer,
    pub took_ms: u64,
}

/// Runtime status information.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub embedder: String,
    pub embedding_dim: usize,
    pub llm: bool,
    pub rerank_stages: Vec<RerankStage>,
    pub documents: usize,
    pub chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"rust"}"#).unwrap();
        assert_eq!(req.mode, SearchMode::Hybrid);
        assert_eq!(req.limit, 10);
        assert!(req.document_ids.is_empty());
        assert!(req.rerank.is_none());
    }

    #[test]
    fn test_search_request_with_overrides() {
        let req: SearchRequest = serde_json::from_str(
            r#"{"query":"rust","mode":"keyword","limit":3,"documentIds":["d1"],"rerank":["deduplicate","keyword_filter"]}"#,
        )
        .unwrap();
        assert_eq!(req.mode, SearchMode::Keyword);
        assert_eq!(req.document_ids, vec!["d1"]);
        assert_eq!(
            req.rerank.unwrap(),
            vec![RerankStage::Deduplicate, RerankStage::KeywordFilter]
        );
    }

    #[test]
    fn test_ingest_request_defaults_to_semantic() {
        let req: IngestRequest = serde_json::from_str(r#"{"id":"d1","content":"text"}"#).unwrap();
        assert_eq!(req.strategy, ChunkStrategy::Semantic);
        assert!(req.metadata.is_empty());
    }

    #[test]
    fn test_settings_reject_unknown_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = KbaseConfig::from_env(dir.path()).unwrap();
        config.rerank_stages = vec!["dedup".into(), "magic".into()];
        assert!(matches!(RuntimeSettings::from_config(&config), Err(Error::Config(_))));

        config.rerank_stages = vec!["keyword".into()];
        let settings = RuntimeSettings::from_config(&config).unwrap();
        assert_eq!(settings.rerank_stages, vec![RerankStage::KeywordFilter]);
    }
}
