//! Fixed-count sentence grouping for fine-grained FAQ chunks.
//! Ignores `chunk_size`.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use kbase_core::{ChunkResult, ChunkingOptions, Metadata, TextChunk};

use crate::spans::trimmed;

/// Terminal punctuation followed by whitespace or end of text.
static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+(\s+|$)").unwrap());

fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        spans.push(start..m.end());
        start = m.end();
    }
    if start < text.len() {
        spans.push(start..text.len());
    }
    spans.retain(|s| !text[s.clone()].trim().is_empty());
    spans
}

pub(crate) fn chunk(text: &str, options: &ChunkingOptions) -> ChunkResult {
    let original_length = text.chars().count();
    let sentences = sentence_spans(text);
    if sentences.is_empty() {
        return ChunkResult::empty(original_length);
    }

    let per_chunk = options.sentences_per_chunk.max(1);
    let mut chunks = Vec::with_capacity(sentences.len().div_ceil(per_chunk));

    for group in sentences.chunks(per_chunk) {
        let raw = group[0].start..group[group.len() - 1].end;
        let span = if options.preserve_whitespace {
            raw
        } else {
            trimmed(text, raw)
        };

        let mut meta = Metadata::new();
        meta.insert("chunkIndex".into(), chunks.len().into());
        meta.insert("sentenceCount".into(), group.len().into());

        chunks.push(TextChunk {
            content: text[span.clone()].to_string(),
            start_index: span.start,
            end_index: span.end,
            metadata: Some(meta),
        });
    }

    ChunkResult::new(chunks, original_length)
}
