//! LRU query cache for embeddings.
//!
//! Avoids re-embedding repeated search queries.
//! Default: 1000 entries, 1-hour TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use kbase_core::Result;

use crate::embedder::{BatchEmbedding, Embedder, Embedding};

struct CacheEntry {
    embedding: Vec<f32>,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Least recently used first.
    order: Vec<String>,
    max_size: usize,
    ttl: Duration,
}

/// Thread-safe LRU cache keyed on the exact query text.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
}

impl QueryCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(max_size),
                order: Vec::with_capacity(max_size),
                max_size: max_size.max(1),
                ttl,
            }),
        }
    }

    pub fn default_cache() -> Self {
        Self::new(1000, Duration::from_secs(3600))
    }

    /// Cached vector, or `None` on a miss or an expired entry.
    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock();
        let ttl = inner.ttl;

        let hit = match inner.entries.get(query) {
            None => return None,
            Some(e) if e.inserted_at.elapsed() >= ttl => None,
            Some(e) => Some(e.embedding.clone()),
        };

        inner.order.retain(|k| k != query);
        match hit {
            Some(embedding) => {
                inner.order.push(query.to_string());
                Some(embedding)
            }
            None => {
                inner.entries.remove(query);
                None
            }
        }
    }

    pub fn put(&self, query: String, embedding: Vec<f32>) {
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(&query) {
            inner.order.retain(|k| k != &query);
        } else {
            while inner.entries.len() >= inner.max_size && !inner.order.is_empty() {
                let oldest = inner.order.remove(0);
                inner.entries.remove(&oldest);
            }
        }

        inner.order.push(query.clone());
        inner.entries.insert(
            query,
            CacheEntry {
                embedding,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

/// Wraps an embedder so single-text embeds (queries) hit the cache first.
/// Batch calls pass straight through; document text rarely repeats.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: QueryCache,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: QueryCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(embedding) = self.cache.get(text) {
            debug!(embedder = self.inner.name(), "query embedding cache hit");
            return Ok(Embedding {
                embedding,
                tokens: 0,
            });
        }
        let fresh = self.inner.embed(text).await?;
        self.cache.put(text.to_string(), fresh.embedding.clone());
        Ok(fresh)
    }

    async fn embed_page(&self, texts: &[&str]) -> Result<BatchEmbedding> {
        self.inner.embed_page(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn batch_limit(&self) -> usize {
        self.inner.batch_limit()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cache_hit_and_miss() {
        let cache = QueryCache::new(10, Duration::from_secs(3600));
        assert!(cache.get("hello").is_none());

        cache.put("hello".into(), vec![1.0, 2.0, 3.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_respects_access() {
        let cache = QueryCache::new(2, Duration::from_secs(3600));
        cache.put("a".into(), vec![1.0]);
        cache.put("b".into(), vec![2.0]);
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").is_some());

        cache.put("c".into(), vec![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = QueryCache::new(10, Duration::from_millis(1));
        cache.put("ephemeral".into(), vec![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("ephemeral").is_none());
        assert!(cache.is_empty());
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding {
                embedding: vec![0.5, 0.5],
                tokens: 2,
            })
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_cached_embedder_skips_repeat_queries() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedder::new(inner.clone(), QueryCache::default_cache());

        let first = cached.embed("what is rrf").await.unwrap();
        let second = cached.embed("what is rrf").await.unwrap();
        assert_eq!(first.embedding, second.embedding);
        assert_eq!(second.tokens, 0);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.embed_batch(&["what is rrf"]).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
