//! LLM-free filters: keyword coverage and near-duplicate removal.

use std::collections::HashSet;

use tracing::debug;

use kbase_core::scoring::{jaccard_of_sets, word_set};
use kbase_core::ScoredChunk;

/// Fraction of whitespace-separated query terms found (case-insensitive
/// substring) in `content`. A query with no terms covers nothing.
pub fn keyword_coverage(query: &str, content: &str) -> f64 {
    let query = query.to_lowercase();
    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let matched = terms.iter().filter(|t| content.contains(*t)).count();
    matched as f64 / terms.len() as f64
}

/// Keep a candidate if its keyword coverage reaches `min_score` or its
/// current score already exceeds `min_score`. Order is preserved.
pub fn filter_by_keywords(query: &str, candidates: Vec<ScoredChunk>, min_score: f64) -> Vec<ScoredChunk> {
    if query.split_whitespace().next().is_none() {
        return candidates;
    }
    let before = candidates.len();
    let kept: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| keyword_coverage(query, &c.content) >= min_score || c.current_score() > min_score)
        .collect();
    debug!(before, after = kept.len(), min_score, "keyword filter");
    kept
}

/// Greedy dedup: a candidate survives only if its word-set Jaccard
/// similarity to every already-kept candidate is below `threshold`.
pub fn deduplicate(candidates: Vec<ScoredChunk>, threshold: f64) -> Vec<ScoredChunk> {
    let before = candidates.len();
    let mut kept_sets: Vec<HashSet<String>> = Vec::with_capacity(candidates.len());
    let mut kept = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let words = word_set(&candidate.content);
        if kept_sets.iter().all(|seen| jaccard_of_sets(seen, &words) < threshold) {
            kept_sets.push(words);
            kept.push(candidate);
        }
    }

    if kept.len() < before {
        debug!("Removed {} near-duplicate candidates", before - kept.len());
    }
    kept
}
