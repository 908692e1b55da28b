//! kbase infer: embedding providers and the query-embedding cache.
//!
//! With an API key configured, `OpenAiEmbedder` (wrapped in a
//! `CachedEmbedder`) is used. Without one, the local `HashingEmbedder`
//! keeps semantic search working offline.

pub mod cache;
pub mod embedder;
pub mod hashing;
pub mod openai;

pub use cache::{CachedEmbedder, QueryCache};
pub use embedder::{BatchEmbedding, Embedder, Embedding};
pub use hashing::HashingEmbedder;
pub use openai::{EmbeddingConfig, OpenAiEmbedder};

use std::sync::Arc;

use kbase_core::Result;

/// Create the best available embedder.
///
/// Tries the HTTP provider first (if an API key is set), falls back to
/// `HashingEmbedder` with `fallback_dim`.
pub fn create_embedder(config: &EmbeddingConfig, fallback_dim: usize) -> Result<Arc<dyn Embedder>> {
    if config.api_key.is_some() {
        match OpenAiEmbedder::new(config) {
            Ok(embedder) => {
                tracing::info!(
                    "Using HTTP embedder {} (dim={})",
                    config.model,
                    embedder.dimension()
                );
                let inner: Arc<dyn Embedder> = Arc::new(embedder);
                return Ok(Arc::new(CachedEmbedder::new(inner, QueryCache::default_cache())));
            }
            Err(e) => {
                tracing::warn!("HTTP embedder unavailable: {}. Falling back to local hashing.", e);
            }
        }
    } else {
        tracing::info!("No embedding API key set. Using local hashing embedder.");
    }

    Ok(Arc::new(HashingEmbedder::new(fallback_dim)?))
}
