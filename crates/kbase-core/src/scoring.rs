//! Scoring helpers shared by fusion and reranking.

use std::collections::HashSet;

use ndarray::ArrayView1;

use crate::error::{Error, Result};
use crate::types::ScoredChunk;

/// `dot(a, b) / (|a| * |b|)`. Zero-norm vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let dot = a.dot(&b) as f64;
    let norm = (a.dot(&a) as f64).sqrt() * (b.dot(&b) as f64).sqrt();
    if norm < 1e-12 {
        return Ok(0.0);
    }
    Ok(dot / norm)
}

/// Lowercased whitespace-separated words.
pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// `|A ∩ B| / |A ∪ B|` over lowercased word sets. Two empty texts are identical.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);
    jaccard_of_sets(&a, &b)
}

pub fn jaccard_of_sets(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Stable descending sort on `current_score()`; ties keep input order and
/// NaN scores sink to the end.
pub fn sort_by_score_desc(chunks: &mut [ScoredChunk]) {
    fn key(chunk: &ScoredChunk) -> f64 {
        let score = chunk.current_score();
        if score.is_nan() {
            f64::NEG_INFINITY
        } else {
            score
        }
    }
    chunks.sort_by(|a, b| key(b).total_cmp(&key(a)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoreStage;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { left: 2, right: 1 }));
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard_similarity("The cat", "the CAT"), 1.0);
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
        assert!((jaccard_similarity("a b c", "a b d") - 0.5).abs() < 1e-9);
        assert_eq!(jaccard_similarity("", ""), 1.0);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut chunks = vec![
            ScoredChunk::semantic_hit("a", "d", "", 0.5),
            ScoredChunk::semantic_hit("b", "d", "", 0.9),
            ScoredChunk::semantic_hit("c", "d", "", 0.5),
        ];
        chunks[0].push_score(ScoreStage::WeightedFusion, 0.5);
        sort_by_score_desc(&mut chunks);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_sort_puts_nan_last() {
        let mut chunks = vec![
            ScoredChunk::semantic_hit("nan", "d", "", f64::NAN),
            ScoredChunk::semantic_hit("low", "d", "", 0.1),
            ScoredChunk::semantic_hit("nan2", "d", "", f64::NAN),
            ScoredChunk::semantic_hit("high", "d", "", 0.8),
        ];
        sort_by_score_desc(&mut chunks);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low", "nan", "nan2"]);
    }
}
