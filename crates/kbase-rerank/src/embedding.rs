//! Embedding rerank: cosine similarity between the query and each
//! candidate, one embedding call per candidate.

use std::time::Duration;

use tracing::debug;

use kbase_core::deadline::bounded;
use kbase_core::scoring::{cosine_similarity, sort_by_score_desc};
use kbase_core::{Result, ScoreStage, ScoredChunk};
use kbase_infer::Embedder;

use crate::types::EmbeddingRerank;

/// Re-score the first `top_k` candidates by cosine similarity to the query.
///
/// Candidates are embedded sequentially. Rescored candidates are sorted
/// descending; any beyond `top_k` follow in their incoming order.
/// Embedding failures and dimension mismatches propagate.
pub async fn rerank_by_embedding(
    query: &str,
    candidates: Vec<ScoredChunk>,
    embedder: &dyn Embedder,
    top_k: usize,
    timeout: Duration,
) -> Result<EmbeddingRerank> {
    let original_order: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
    if candidates.is_empty() || top_k == 0 {
        return Ok(EmbeddingRerank {
            results: candidates,
            original_order,
        });
    }

    let query_vec = bounded("query embedding", timeout, embedder.embed(query))
        .await?
        .embedding;

    let mut head = candidates;
    let tail = head.split_off(top_k.min(head.len()));

    for candidate in head.iter_mut() {
        let embedded = bounded("candidate embedding", timeout, embedder.embed(&candidate.content)).await?;
        let similarity = cosine_similarity(&query_vec, &embedded.embedding)?;
        candidate.push_score(ScoreStage::EmbeddingRerank, similarity);
    }

    sort_by_score_desc(&mut head);
    debug!(rescored = head.len(), passed_through = tail.len(), "embedding rerank");
    head.extend(tail);

    Ok(EmbeddingRerank {
        results: head,
        original_order,
    })
}
