//! Orchestrator: ties chunking, embedding, storage, retrieval, reranking
//! and answer synthesis together.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use kbase_chat::{Answer, AnswerSynthesizer, ChatCompleter, HttpChatClient, LlmConfig};
use kbase_chunk::{ChunkStrategy, Chunker};
use kbase_core::deadline::bounded;
use kbase_core::{
    ChunkResult, ChunkingOptions, Error, KbaseConfig, Result, RetrievalResult, SearchFilters,
    TenantScope,
};
use kbase_infer::{create_embedder, Embedder, EmbeddingConfig};
use kbase_rerank::{RerankPipeline, RerankStage};
use kbase_retrieve::RetrievalEngine;
use kbase_store::{content_hash, ChunkInput, DocumentInput, SqliteStore};

use crate::types::*;

/// Top-level orchestrator. Cheap to share behind an `Arc`; every method
/// takes `&self`.
pub struct Orchestrator {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    engine: RetrievalEngine,
    pipeline: RerankPipeline,
    rerank_stages: Vec<RerankStage>,
    synthesizer: Option<AnswerSynthesizer>,
    call_timeout: Duration,
}

impl Orchestrator {
    /// Wire up explicit collaborators. Fails on malformed settings, or if a
    /// configured rerank stage needs a collaborator that is missing.
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn Embedder>,
        chat: Option<Arc<dyn ChatCompleter>>,
        settings: RuntimeSettings,
    ) -> Result<Self> {
        if store.embedding_dim() != embedder.dimension() {
            return Err(Error::DimensionMismatch {
                left: embedder.dimension(),
                right: store.embedding_dim(),
            });
        }

        let chunker = Chunker::new(settings.chunking)?;
        let engine = RetrievalEngine::new(embedder.clone(), settings.weights)?
            .with_fusion(settings.fusion)
            .with_timeout(settings.call_timeout);

        let mut pipeline = RerankPipeline::new(settings.rerank)
            .with_embedder(embedder.clone())
            .with_timeout(settings.call_timeout);
        if let Some(chat) = &chat {
            pipeline = pipeline.with_chat(chat.clone());
        }
        pipeline
            .check(&settings.rerank_stages)
            .map_err(|e| Error::Config(e.to_string()))?;

        let synthesizer = chat.map(|chat| AnswerSynthesizer::new(chat).with_timeout(settings.call_timeout));

        info!(
            "Orchestrator initialized: embedder={} (dim={}), llm={}, rerank=[{}]",
            embedder.name(),
            embedder.dimension(),
            synthesizer.is_some(),
            settings
                .rerank_stages
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(",")
        );

        Ok(Self {
            store,
            embedder,
            chunker,
            engine,
            pipeline,
            rerank_stages: settings.rerank_stages,
            synthesizer,
            call_timeout: settings.call_timeout,
        })
    }

    /// Build everything from service configuration: best available embedder,
    /// store sized to it, and a chat client if any provider has a key.
    pub fn from_config(config: &KbaseConfig) -> Result<Self> {
        let settings = RuntimeSettings::from_config(config)?;

        let embedding_config = EmbeddingConfig::from_env(settings.call_timeout);
        let embedder = create_embedder(&embedding_config, config.embedding_dim)?;

        let store = Arc::new(SqliteStore::open(&config.data_paths.store, embedder.dimension())?);

        let llm_config = LlmConfig::load(&config.data_paths.llm_config_file);
        let chat: Option<Arc<dyn ChatCompleter>> =
            match HttpChatClient::from_config(&llm_config, settings.call_timeout)? {
                Some(client) => {
                    info!("Chat provider: {}", client.provider());
                    Some(Arc::new(client))
                }
                None => {
                    warn!("No LLM provider configured; /api/ask and llm rerank are unavailable");
                    None
                }
            };

        Self::new(store, embedder, chat, settings)
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn has_llm(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn rerank_stages(&self) -> &[RerankStage] {
        &self.rerank_stages
    }

    pub fn status(&self) -> Result<RuntimeStatus> {
        let stats = self.store.stats()?;
        Ok(RuntimeStatus {
            embedder: self.embedder.name().to_string(),
            embedding_dim: self.embedder.dimension(),
            llm: self.has_llm(),
            rerank_stages: self.rerank_stages.clone(),
            documents: stats.documents,
            chunks: stats.chunks,
        })
    }

    // ---------------------------------------------------------------
    // Chunking
    // ---------------------------------------------------------------

    /// Chunk without storing. `options` replaces the configured defaults.
    pub fn chunk(
        &self,
        text: &str,
        strategy: ChunkStrategy,
        options: Option<ChunkingOptions>,
    ) -> Result<ChunkResult> {
        match options {
            Some(options) => Ok(Chunker::new(options)?.chunk_with(strategy, text)),
            None => Ok(self.chunker.chunk_with(strategy, text)),
        }
    }

    // ---------------------------------------------------------------
    // Ingest
    // ---------------------------------------------------------------

    /// Chunk, embed and store a document, replacing any previous chunks.
    ///
    /// Skipped when the stored fingerprint matches: same content, title,
    /// metadata, strategy and resolved chunking options.
    pub async fn ingest_document(&self, scope: &TenantScope, req: IngestRequest) -> Result<IngestOutcome> {
        let start = Instant::now();
        if req.id.trim().is_empty() {
            return Err(Error::InvalidInput("document id must not be empty".into()));
        }

        let custom;
        let chunker = match req.extension.as_deref() {
            Some(ext) => {
                custom = Chunker::new(ChunkingOptions::for_extension(Some(ext)))?;
                &custom
            }
            None => &self.chunker,
        };

        let hash = ingest_fingerprint(&req, chunker.options())?;
        if let Some(existing) = self.store.get_document(scope, &req.id)? {
            if existing.content_hash == hash {
                debug!("Document {} unchanged, skipping", req.id);
                return Ok(IngestOutcome {
                    document_id: req.id,
                    status: IngestStatus::Unchanged,
                    chunk_count: existing.chunk_count,
                    total_tokens: 0,
                    took_ms: start.elapsed().as_millis() as u64,
                });
            }
        }

        let chunked = chunker.chunk_with(req.strategy, &req.content);

        let texts: Vec<&str> = chunked.chunks.iter().map(|c| c.content.as_str()).collect();
        let embedded = if texts.is_empty() {
            Default::default()
        } else {
            bounded("batch embedding", self.call_timeout, self.embedder.embed_batch(&texts)).await?
        };
        if embedded.embeddings.len() != texts.len() {
            return Err(Error::dependency(
                self.embedder.name(),
                format!("expected {} embeddings, got {}", texts.len(), embedded.embeddings.len()),
            ));
        }

        let chunks: Vec<ChunkInput> = chunked
            .chunks
            .into_iter()
            .zip(embedded.embeddings)
            .map(|(chunk, e)| ChunkInput {
                chunk,
                embedding: e.embedding,
            })
            .collect();

        let doc = DocumentInput {
            id: req.id,
            organisation_id: scope.organisation_id.clone(),
            title: req.title,
            content_hash: hash,
            metadata: req.metadata,
        };
        let record = self.store.replace_document(&doc, &chunks)?;

        let outcome = IngestOutcome {
            document_id: record.id,
            status: IngestStatus::Indexed,
            chunk_count: record.chunk_count,
            total_tokens: embedded.total_tokens,
            took_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Indexed document {} ({} chunks, {} tokens) in {}ms",
            outcome.document_id, outcome.chunk_count, outcome.total_tokens, outcome.took_ms
        );
        Ok(outcome)
    }

    pub fn delete_document(&self, scope: &TenantScope, id: &str) -> Result<bool> {
        let deleted = self.store.delete_document(scope, id)?;
        if deleted {
            info!("Deleted document {}", id);
        }
        Ok(deleted)
    }

    // ---------------------------------------------------------------
    // Search / ask
    // ---------------------------------------------------------------

    /// Retrieve by `req.mode`, then run the rerank stages.
    pub async fn search(&self, scope: &TenantScope, req: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let limit = req.limit.min(MAX_SEARCH_LIMIT);
        let filters = SearchFilters {
            scope: scope.clone(),
            document_ids: req.document_ids.clone(),
        };

        let retrieval = self
            .engine
            .search(
                req.mode,
                &req.query,
                self.store.as_ref(),
                self.store.as_ref(),
                limit,
                &filters,
            )
            .await?;

        let stages = req.rerank.as_deref().unwrap_or(self.rerank_stages.as_slice());
        let (results, pipeline) = self.pipeline.run(&req.query, retrieval.results, stages).await?;

        Ok(SearchResponse {
            retrieval: RetrievalResult {
                results,
                query: retrieval.query,
                took_ms: start.elapsed().as_millis() as u64,
            },
            mode: req.mode,
            pipeline,
        })
    }

    /// Search, then answer from the results.
    ///
    /// Without a chat model only the empty-result answer is possible.
    pub async fn ask(&self, scope: &TenantScope, req: &AskRequest) -> Result<AskResponse> {
        let start = Instant::now();
        let search = self.search(scope, &req.as_search()).await?;

        let answer = match &self.synthesizer {
            Some(synthesizer) => synthesizer.answer(&req.question, &search.retrieval).await?,
            None if search.retrieval.is_empty() => Answer::no_relevant_information(),
            None => return Err(Error::Config("no LLM provider configured".into())),
        };

        Ok(AskResponse {
            answer,
            took_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Hash of everything that shapes a document's row and its chunks.
fn ingest_fingerprint(req: &IngestRequest, options: &ChunkingOptions) -> Result<String> {
    let metadata: BTreeMap<&String, &serde_json::Value> = req.metadata.iter().collect();
    let settings = serde_json::to_string(&(req.strategy, options, &req.title, metadata))?;
    Ok(content_hash(&format!("{settings}\n{}", req.content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kbase_chat::{ChatCompletion, ChatMessage, ChatUsage, NO_RELEVANT_INFORMATION};
    use kbase_infer::HashingEmbedder;

    const DIM: usize = 64;

    const GUIDE: &str = "# Ownership\n\nEvery value in Rust has a single owner. When the owner goes out of scope the value is dropped.\n\n\
# Borrowing\n\nReferences let code use a value without taking ownership. The borrow checker enforces the rules at compile time.";

    fn orchestrator_with(chat: Option<Arc<dyn ChatCompleter>>) -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path(), DIM).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM).unwrap());
        let settings = RuntimeSettings {
            chunking: ChunkingOptions::new(120, 20),
            ..RuntimeSettings::default()
        };
        let orchestrator = Orchestrator::new(store, embedder, chat, settings).unwrap();
        (orchestrator, dir)
    }

    fn orchestrator() -> (Orchestrator, tempfile::TempDir) {
        orchestrator_with(None)
    }

    fn doc(id: &str, content: &str) -> IngestRequest {
        IngestRequest {
            id: id.into(),
            title: Some(format!("Title {id}")),
            content: content.into(),
            metadata: Default::default(),
            strategy: ChunkStrategy::Semantic,
            extension: None,
        }
    }

    struct Echo;

    #[async_trait]
    impl ChatCompleter for Echo {
        async fn chat_complete(
            &self,
            messages: &[ChatMessage],
            _model: Option<&str>,
            _temperature: f64,
            _max_tokens: usize,
        ) -> Result<ChatCompletion> {
            let prompt = &messages[messages.len() - 1].content;
            Ok(ChatCompletion {
                content: format!("Seen {} chars [1]", prompt.len()),
                model: "echo".into(),
                usage: ChatUsage::default(),
            })
        }

        fn default_model(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_ingest_then_search() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");

        let outcome = orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();
        assert_eq!(outcome.status, IngestStatus::Indexed);
        assert!(outcome.chunk_count >= 2);
        assert_eq!(orch.store().count_chunks(&scope).unwrap(), outcome.chunk_count);

        let response = orch
            .search(&scope, &SearchRequest::new("borrow checker"))
            .await
            .unwrap();
        assert!(!response.retrieval.is_empty());
        assert!(response
            .retrieval
            .results
            .iter()
            .any(|c| c.content.contains("borrow checker")));
        assert_eq!(response.pipeline.stage_order(), vec![RerankStage::Deduplicate]);
    }

    #[tokio::test]
    async fn test_unchanged_content_is_skipped() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");

        let first = orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();
        let second = orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();
        assert_eq!(second.status, IngestStatus::Unchanged);
        assert_eq!(second.chunk_count, first.chunk_count);
    }

    #[tokio::test]
    async fn test_resync_with_new_title_and_strategy_is_reindexed() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");
        let text = "One. Two. Three. Four. Five. Six. Seven.";

        let mut req = doc("counting", text);
        req.title = Some("Old".into());
        let first = orch.ingest_document(&scope, req).await.unwrap();
        assert_eq!(first.status, IngestStatus::Indexed);
        assert_eq!(first.chunk_count, 1);

        let mut req = doc("counting", text);
        req.title = Some("New".into());
        req.strategy = ChunkStrategy::Sentence;
        let second = orch.ingest_document(&scope, req).await.unwrap();
        assert_eq!(second.status, IngestStatus::Indexed);
        assert_eq!(second.chunk_count, 3);

        let stored = orch.store().get_document(&scope, "counting").unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("New"));
        assert_eq!(stored.chunk_count, 3);
        assert_eq!(orch.store().count_chunks(&scope).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_resync_with_new_metadata_or_extension_is_reindexed() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");

        orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();

        let mut req = doc("guide", GUIDE);
        req.metadata.insert("source".into(), "wiki".into());
        let outcome = orch.ingest_document(&scope, req.clone()).await.unwrap();
        assert_eq!(outcome.status, IngestStatus::Indexed);

        let again = orch.ingest_document(&scope, req.clone()).await.unwrap();
        assert_eq!(again.status, IngestStatus::Unchanged);

        req.extension = Some("rs".into());
        let outcome = orch.ingest_document(&scope, req).await.unwrap();
        assert_eq!(outcome.status, IngestStatus::Indexed);
    }

    #[tokio::test]
    async fn test_changed_content_replaces_chunks() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");

        orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();
        let outcome = orch
            .ingest_document(&scope, doc("guide", "A single short paragraph."))
            .await
            .unwrap();
        assert_eq!(outcome.status, IngestStatus::Indexed);
        assert_eq!(outcome.chunk_count, 1);
        assert_eq!(orch.store().count_chunks(&scope).unwrap(), 1);

        let response = orch
            .search(&scope, &SearchRequest::new("borrow checker"))
            .await
            .unwrap();
        assert!(response
            .retrieval
            .results
            .iter()
            .all(|c| !c.content.contains("borrow checker")));
    }

    #[tokio::test]
    async fn test_search_is_tenant_scoped() {
        let (orch, _dir) = orchestrator();
        orch.ingest_document(&TenantScope::new("org-1"), doc("guide", GUIDE))
            .await
            .unwrap();

        let response = orch
            .search(&TenantScope::new("org-2"), &SearchRequest::new("ownership"))
            .await
            .unwrap();
        assert!(response.retrieval.is_empty());
    }

    #[tokio::test]
    async fn test_request_stages_override_defaults() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");
        orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();

        let mut req = SearchRequest::new("ownership");
        req.mode = kbase_retrieve::SearchMode::Keyword;
        req.rerank = Some(vec![RerankStage::KeywordFilter, RerankStage::EmbeddingRerank]);
        let response = orch.search(&scope, &req).await.unwrap();

        assert_eq!(
            response.pipeline.stage_order(),
            vec![RerankStage::KeywordFilter, RerankStage::EmbeddingRerank]
        );
        assert!(response.retrieval.results.iter().all(|c| c.semantic_score == 0.0));
    }

    #[tokio::test]
    async fn test_ask_without_llm() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");

        let empty = orch.ask(&scope, &AskRequest::new("what is ownership")).await.unwrap();
        assert_eq!(empty.answer.answer, NO_RELEVANT_INFORMATION);

        orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();
        let err = orch.ask(&scope, &AskRequest::new("what is ownership")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_ask_with_llm_cites_sources() {
        let (orch, _dir) = orchestrator_with(Some(Arc::new(Echo)));
        let scope = TenantScope::new("org-1");
        orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();

        let response = orch.ask(&scope, &AskRequest::new("what is ownership")).await.unwrap();
        assert!(response.answer.answer.starts_with("Seen"));
        assert!(!response.answer.sources.is_empty());
        assert_eq!(response.answer.sources[0].document_id, "guide");
        assert_eq!(response.answer.model.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (orch, _dir) = orchestrator();
        let scope = TenantScope::new("org-1");
        orch.ingest_document(&scope, doc("guide", GUIDE)).await.unwrap();

        assert!(!orch.delete_document(&TenantScope::new("org-2"), "guide").unwrap());
        assert!(orch.delete_document(&scope, "guide").unwrap());
        assert_eq!(orch.store().count_chunks(&scope).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_document_id_rejected() {
        let (orch, _dir) = orchestrator();
        let err = orch
            .ingest_document(&TenantScope::new("org-1"), doc(" ", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_llm_stage_without_chat_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path(), DIM).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM).unwrap());
        let settings = RuntimeSettings {
            rerank_stages: vec![RerankStage::LlmRerank],
            ..RuntimeSettings::default()
        };
        let err = Orchestrator::new(store, embedder, None, settings).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_store_dimension_must_match_embedder() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path(), 32).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM).unwrap());
        let err = Orchestrator::new(store, embedder, None, RuntimeSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::DimensionMismatch { left: 64, right: 32 }));
    }

    #[test]
    fn test_chunk_preview_uses_custom_options() {
        let (orch, _dir) = orchestrator();
        let text = "One. Two. Three. Four.";
        let result = orch
            .chunk(text, ChunkStrategy::Sentence, None)
            .unwrap();
        assert_eq!(result.metadata.chunk_count, 2);

        let mut options = ChunkingOptions::default();
        options.sentences_per_chunk = 1;
        let result = orch.chunk(text, ChunkStrategy::Sentence, Some(options)).unwrap();
        assert_eq!(result.metadata.chunk_count, 4);

        assert!(orch
            .chunk(text, ChunkStrategy::Recursive, Some(ChunkingOptions::new(10, 10)))
            .is_err());
    }
}
