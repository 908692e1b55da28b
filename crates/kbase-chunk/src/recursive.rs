//! Recursive separator splitting.
//!
//! Tries separators in order (`\n\n` → `\n` → `. ` → ` ` → characters),
//! re-splitting any piece still over `chunk_size` with the remaining
//! separators. Overlap is re-injected after the greedy pass.

use std::ops::Range;

use kbase_core::{ChunkResult, ChunkingOptions, TextChunk};

use crate::spans::{chunk_metadata, char_len, pack, pieces, tail_start};

/// Contiguous spans covering all of `text`. A span exceeds `chunk_size`
/// only when no remaining separator can break it.
pub(crate) fn split_spans(text: &str, separators: &[String], chunk_size: usize) -> Vec<Range<usize>> {
    let Some((separator, remaining)) = separators.split_first() else {
        return if text.is_empty() { Vec::new() } else { vec![0..text.len()] };
    };

    pack(text, pieces(text, separator), chunk_size, |piece| {
        if remaining.is_empty() {
            return vec![piece];
        }
        let base = piece.start;
        split_spans(&text[piece], remaining, chunk_size)
            .into_iter()
            .map(|s| s.start + base..s.end + base)
            .collect()
    })
}

/// Fold whitespace-only spans into the span that follows them, or into the
/// last span at the end of the text, so no chunk is blank.
fn absorb_blank_spans(text: &str, spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
    let mut out: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    let mut pending: Option<usize> = None;
    for span in spans {
        if text[span.clone()].trim().is_empty() {
            pending.get_or_insert(span.start);
            continue;
        }
        out.push(pending.take().unwrap_or(span.start)..span.end);
    }
    if let (Some(_), Some(last)) = (pending, out.last_mut()) {
        last.end = text.len();
    }
    out
}

pub(crate) fn chunk(text: &str, options: &ChunkingOptions) -> ChunkResult {
    let original_length = text.chars().count();
    if text.trim().is_empty() {
        return ChunkResult::empty(original_length);
    }

    let spans = absorb_blank_spans(text, split_spans(text, &options.separators, options.chunk_size));
    let mut chunks = Vec::with_capacity(spans.len());
    let mut previous: Option<Range<usize>> = None;

    for span in spans {
        // Spans are contiguous, so the previous tail immediately precedes this span.
        let start = previous
            .as_ref()
            .map(|prev| tail_start(text, prev, options.chunk_overlap))
            .unwrap_or(span.start);
        let overlap = char_len(text, &(start..span.start));

        chunks.push(TextChunk {
            content: text[start..span.end].to_string(),
            start_index: start,
            end_index: span.end,
            metadata: Some(chunk_metadata(chunks.len(), overlap)),
        });
        previous = Some(span);
    }

    ChunkResult::new(chunks, original_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(size: usize, overlap: usize) -> ChunkingOptions {
        ChunkingOptions::new(size, overlap)
    }

    fn overlap_of(chunk: &TextChunk) -> usize {
        chunk.metadata.as_ref().unwrap()["overlap"].as_u64().unwrap() as usize
    }

    #[test]
    fn test_short_text_single_chunk() {
        let result = chunk("Hello, world!", &opts(512, 50));
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].content, "Hello, world!");
        assert_eq!(result.metadata.chunk_count, 1);
        assert_eq!(result.metadata.original_length, 13);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert_eq!(chunk("", &opts(10, 2)).metadata.chunk_count, 0);
        assert_eq!(chunk(" \n\n ", &opts(10, 2)).chunks.len(), 0);
    }

    #[test]
    fn test_chunks_cover_source_without_gaps() {
        let text = "First paragraph has several words.\n\nSecond one is here. It has two sentences.\nA new line follows with more words to split across chunks.";
        let result = chunk(text, &opts(30, 5));
        assert!(result.chunks.len() > 2);

        let rebuilt: String = result
            .chunks
            .iter()
            .map(|c| c.content.chars().skip(overlap_of(c)).collect::<String>())
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_overlap_is_tail_of_previous_chunk() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let k = 4;
        let result = chunk(text, &opts(20, k));

        for pair in result.chunks.windows(2) {
            let prev_raw: String = pair[0].content.chars().skip(overlap_of(&pair[0])).collect();
            let prefix: String = pair[1].content.chars().take(k).collect();
            if prev_raw.chars().count() >= k {
                let tail: String = prev_raw.chars().skip(prev_raw.chars().count() - k).collect();
                assert_eq!(prefix, tail);
            }
        }
    }

    #[test]
    fn test_offsets_reference_source() {
        let text = "repeat me. repeat me. repeat me. repeat me.";
        let result = chunk(text, &opts(12, 3));
        let mut last_start = None;
        for c in &result.chunks {
            assert!(c.start_index < c.end_index);
            assert!(c.end_index <= text.len());
            assert_eq!(&text[c.start_index..c.end_index], c.content);
            if let Some(prev) = last_start {
                assert!(c.start_index > prev);
            }
            last_start = Some(c.start_index);
        }
    }

    #[test]
    fn test_whitespace_only_span_joins_the_next_chunk() {
        let text = "\t   word\n";
        let result = chunk(text, &opts(7, 6).with_separators([" ", ""]));
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].content, text);
    }

    #[test]
    fn test_no_blank_chunks_and_source_rebuilds() {
        let text = "lead words here   \n\n\n   more words follow on\n\n  \t ";
        let result = chunk(text, &opts(8, 3).with_separators(["\n\n", " "]));
        assert!(result.chunks.iter().all(|c| !c.content.trim().is_empty()));

        let rebuilt: String = result
            .chunks
            .iter()
            .map(|c| c.content.chars().skip(overlap_of(c)).collect::<String>())
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_oversized_atom_emitted_whole() {
        let text = "a".repeat(1000);
        let options = opts(10, 0).with_separators([" "]);
        let result = chunk(&text, &options);
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].content.len(), 1000);
    }

    #[test]
    fn test_character_fallback_bounds_size() {
        let text = "a".repeat(95);
        let result = chunk(&text, &opts(10, 0));
        assert_eq!(result.chunks.len(), 10);
        assert!(result.chunks.iter().all(|c| c.content.len() <= 10));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "日本語のテキスト。 これは二つ目の文です。 三つ目もあります。";
        let result = chunk(text, &opts(8, 2));
        for c in &result.chunks {
            assert_eq!(&text[c.start_index..c.end_index], c.content);
        }
    }
}
