//! Rerank pipeline execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use kbase_chat::ChatCompleter;
use kbase_core::deadline::DEFAULT_CALL_TIMEOUT;
use kbase_core::{Error, Result, ScoredChunk};
use kbase_infer::Embedder;

use crate::embedding::rerank_by_embedding;
use crate::filter::{deduplicate, filter_by_keywords};
use crate::llm::rerank_by_llm;
use crate::types::*;

/// Runs an ordered list of rerank stages over a candidate list.
///
/// Stage order is data: the caller passes it to [`RerankPipeline::run`].
pub struct RerankPipeline {
    embedder: Option<Arc<dyn Embedder>>,
    chat: Option<Arc<dyn ChatCompleter>>,
    options: RerankOptions,
    timeout: Duration,
}

impl Default for RerankPipeline {
    fn default() -> Self {
        Self::new(RerankOptions::default())
    }
}

impl RerankPipeline {
    /// A pipeline that can only run the LLM-free stages until collaborators
    /// are attached.
    pub fn new(options: RerankOptions) -> Self {
        Self {
            embedder: None,
            chat: None,
            options,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatCompleter>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn options(&self) -> &RerankOptions {
        &self.options
    }

    /// Fail fast if a stage needs a collaborator this pipeline lacks.
    pub fn check(&self, stages: &[RerankStage]) -> Result<()> {
        for stage in stages {
            match stage {
                RerankStage::EmbeddingRerank if self.embedder.is_none() => {
                    return Err(Error::Config("embedding rerank needs an embedder".into()));
                }
                RerankStage::LlmRerank if self.chat.is_none() => {
                    return Err(Error::Config("llm rerank needs a chat model".into()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Run `stages` in order.
    ///
    /// Only configuration problems and embedding failures (including
    /// dimension mismatches) abort the run; the LLM stage degrades to a no-op.
    pub async fn run(
        &self,
        query: &str,
        candidates: Vec<ScoredChunk>,
        stages: &[RerankStage],
    ) -> Result<(Vec<ScoredChunk>, PipelineReport)> {
        self.check(stages)?;

        let start = Instant::now();
        let mut report = PipelineReport::default();
        let mut current = candidates;

        for &stage in stages {
            let stage_start = Instant::now();
            let input = current.len();
            let mut degraded = false;
            let mut original_order = None;

            current = match stage {
                RerankStage::Deduplicate => deduplicate(current, self.options.similarity_threshold),
                RerankStage::KeywordFilter => {
                    filter_by_keywords(query, current, self.options.min_keyword_score)
                }
                RerankStage::EmbeddingRerank => {
                    let embedder = self
                        .embedder
                        .as_deref()
                        .ok_or_else(|| Error::Config("embedding rerank needs an embedder".into()))?;
                    let out = rerank_by_embedding(
                        query,
                        current,
                        embedder,
                        self.options.embedding_top_k,
                        self.timeout,
                    )
                    .await?;
                    original_order = Some(out.original_order);
                    out.results
                }
                RerankStage::LlmRerank => {
                    let chat = self
                        .chat
                        .as_deref()
                        .ok_or_else(|| Error::Config("llm rerank needs a chat model".into()))?;
                    let out = rerank_by_llm(query, current, chat, self.options.llm_top_k, self.timeout).await;
                    degraded = out.degraded;
                    out.results
                }
            };

            report.stages.push(StageReport {
                stage,
                input,
                output: current.len(),
                duration_ms: stage_start.elapsed().as_millis() as u64,
                degraded,
                original_order,
            });
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        if !stages.is_empty() {
            info!(
                "Rerank pipeline [{}] kept {} candidates in {}ms",
                stages.iter().map(|s| s.name()).collect::<Vec<_>>().join(" > "),
                current.len(),
                report.duration_ms
            );
        }

        Ok((current, report))
    }
}
