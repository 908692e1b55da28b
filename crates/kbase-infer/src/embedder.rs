//! Embedding provider trait.
//!
//! Implementations:
//! - `OpenAiEmbedder`: any OpenAI-compatible `/embeddings` endpoint
//! - `HashingEmbedder`: deterministic feature hashing, no network
//! - `CachedEmbedder`: LRU/TTL wrapper around another embedder

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kbase_core::Result;

/// Most providers accept up to 2048 inputs per request.
pub const DEFAULT_BATCH_LIMIT: usize = 2048;

/// One embedded text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub embedding: Vec<f32>,
    pub tokens: usize,
}

/// Embeddings for a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEmbedding {
    pub embeddings: Vec<Embedding>,
    pub total_tokens: usize,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed at most `batch_limit()` texts. Defaults to one `embed` call per text.
    async fn embed_page(&self, texts: &[&str]) -> Result<BatchEmbedding> {
        let mut page = BatchEmbedding::default();
        for text in texts {
            let e = self.embed(text).await?;
            page.total_tokens += e.tokens;
            page.embeddings.push(e);
        }
        Ok(page)
    }

    /// Embed any number of texts, paging at `batch_limit()`. Output order
    /// matches input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<BatchEmbedding> {
        let mut out = BatchEmbedding {
            embeddings: Vec::with_capacity(texts.len()),
            total_tokens: 0,
        };
        for page in texts.chunks(self.batch_limit().max(1)) {
            let embedded = self.embed_page(page).await?;
            out.total_tokens += embedded.total_tokens;
            out.embeddings.extend(embedded.embeddings);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;

    fn batch_limit(&self) -> usize {
        DEFAULT_BATCH_LIMIT
    }

    /// Short identifier for logs and health output.
    fn name(&self) -> &str;
}
