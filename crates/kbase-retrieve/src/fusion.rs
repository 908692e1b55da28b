//! Merging ranked result lists.
//!
//! Both strategies key on chunk id, keep first-seen order for ties and
//! record their result as a new stage score.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use kbase_core::scoring::sort_by_score_desc;
use kbase_core::{RetrievalWeights, ScoreStage, ScoredChunk};

pub const DEFAULT_RRF_K: usize = 60;

/// How `hybrid_search` combines its two lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FusionStrategy {
    /// `semantic * semantic_weight + keyword * keyword_weight`.
    #[default]
    Weighted,
    /// Rank-based; ignores raw scores.
    ReciprocalRank { k: usize },
}

impl FusionStrategy {
    pub fn rrf() -> Self {
        Self::ReciprocalRank { k: DEFAULT_RRF_K }
    }
}

/// Insertion-ordered merge keyed on chunk id.
#[derive(Default)]
struct Merged {
    chunks: Vec<ScoredChunk>,
    index: HashMap<String, usize>,
}

impl Merged {
    /// Returns the position of the (possibly merged) chunk.
    fn add(&mut self, hit: ScoredChunk) -> usize {
        if let Some(&pos) = self.index.get(&hit.id) {
            absorb(&mut self.chunks[pos], hit);
            return pos;
        }
        let pos = self.chunks.len();
        self.index.insert(hit.id.clone(), pos);
        self.chunks.push(hit);
        pos
    }
}

/// Copy constituent scores `target` does not have yet. First source wins.
fn absorb(target: &mut ScoredChunk, hit: ScoredChunk) {
    if let Some(score) = hit.score_for(ScoreStage::Semantic) {
        if target.score_for(ScoreStage::Semantic).is_none() {
            target.semantic_score = hit.semantic_score;
            target.push_score(ScoreStage::Semantic, score);
        }
    }
    if let Some(score) = hit.score_for(ScoreStage::Keyword) {
        if target.score_for(ScoreStage::Keyword).is_none() {
            target.keyword_score = hit.keyword_score;
            target.keyword_fallback = hit.keyword_fallback;
            target.push_score(ScoreStage::Keyword, score);
        }
    }
    for (key, value) in hit.metadata {
        target.metadata.entry(key).or_insert(value);
    }
}

/// Make sure a collaborator hit records its own score as a stage, so
/// `current_score()` reflects it even if the collaborator left history empty.
pub(crate) fn ensure_stage(mut hit: ScoredChunk, stage: ScoreStage) -> ScoredChunk {
    if hit.score_for(stage).is_none() {
        let score = match stage {
            ScoreStage::Keyword => hit.keyword_score,
            _ => hit.semantic_score,
        };
        hit.push_score(stage, score);
    }
    hit
}

/// Weighted-sum fusion.
///
/// A chunk in both lists scores `s * semantic_weight + k * keyword_weight`;
/// a chunk in one list scores that list's score times its weight alone.
/// Result is sorted descending (stable) and truncated to `limit`.
pub fn fuse_weighted(
    semantic: Vec<ScoredChunk>,
    keyword: Vec<ScoredChunk>,
    weights: &RetrievalWeights,
    limit: usize,
) -> Vec<ScoredChunk> {
    let mut merged = Merged::default();
    let mut from_semantic = HashSet::with_capacity(semantic.len());
    let mut from_keyword = HashSet::with_capacity(keyword.len());

    for hit in semantic {
        from_semantic.insert(merged.add(ensure_stage(hit, ScoreStage::Semantic)));
    }
    for hit in keyword {
        from_keyword.insert(merged.add(ensure_stage(hit, ScoreStage::Keyword)));
    }

    let mut chunks = merged.chunks;
    for (pos, chunk) in chunks.iter_mut().enumerate() {
        let in_semantic = from_semantic.contains(&pos);
        let in_keyword = from_keyword.contains(&pos);
        let score = match (in_semantic, in_keyword) {
            (true, true) => {
                chunk.semantic_score * weights.semantic_weight + chunk.keyword_score * weights.keyword_weight
            }
            (true, false) => chunk.semantic_score * weights.semantic_weight,
            (false, true) => chunk.keyword_score * weights.keyword_weight,
            (false, false) => 0.0,
        };
        chunk.push_score(ScoreStage::WeightedFusion, score);
    }

    sort_by_score_desc(&mut chunks);
    chunks.truncate(limit);
    chunks
}

/// Reciprocal rank fusion over any number of ranked lists.
///
/// Each appearance at 0-based rank `r` contributes `1 / (k + r + 1)`;
/// contributions for the same chunk id are summed. Not truncated.
pub fn reciprocal_rank_fusion(lists: Vec<Vec<ScoredChunk>>, k: usize) -> Vec<ScoredChunk> {
    let mut merged = Merged::default();
    let mut totals: Vec<f64> = Vec::new();

    for list in lists {
        for (rank, hit) in list.into_iter().enumerate() {
            let pos = merged.add(hit);
            if pos == totals.len() {
                totals.push(0.0);
            }
            totals[pos] += 1.0 / (k as f64 + rank as f64 + 1.0);
        }
    }

    let mut chunks = merged.chunks;
    for (chunk, total) in chunks.iter_mut().zip(totals) {
        chunk.push_score(ScoreStage::ReciprocalRankFusion, total);
    }
    sort_by_score_desc(&mut chunks);
    chunks
}
