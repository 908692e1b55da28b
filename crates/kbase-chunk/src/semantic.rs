//! Structure-aware chunking: split on markdown headings and blank lines,
//! pack sections up to `chunk_size`, step back by `chunk_overlap` between
//! chunks.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use kbase_core::{ChunkResult, ChunkingOptions, TextChunk};

use crate::recursive::split_spans;
use crate::spans::{char_len, chunk_metadata, pack, tail_start, trimmed};

/// Group 1: a heading line starts here. Group 2: a blank-line break.
static BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^#{1,6}[ \t])|(\n[ \t]*\n)").unwrap());

/// Separators used for a single section that alone exceeds `chunk_size`.
static OVERSIZED_SEPARATORS: Lazy<Vec<String>> = Lazy::new(|| vec![" ".to_string(), String::new()]);

/// Contiguous section spans. Headings open a section; a blank line closes one.
fn section_spans(text: &str) -> Vec<Range<usize>> {
    let mut boundaries = vec![0, text.len()];
    for caps in BOUNDARY_RE.captures_iter(text) {
        if let Some(heading) = caps.get(1) {
            boundaries.push(heading.start());
        } else if let Some(blank) = caps.get(2) {
            boundaries.push(blank.end());
        }
    }
    boundaries.sort_unstable();
    boundaries.dedup();

    boundaries
        .windows(2)
        .filter(|w| w[0] < w[1])
        .map(|w| w[0]..w[1])
        .collect()
}

pub(crate) fn chunk(text: &str, options: &ChunkingOptions) -> ChunkResult {
    let original_length = text.chars().count();
    if text.trim().is_empty() {
        return ChunkResult::empty(original_length);
    }

    let windows = pack(text, section_spans(text), options.chunk_size, |section| {
        let base = section.start;
        split_spans(&text[section], &OVERSIZED_SEPARATORS, options.chunk_size)
            .into_iter()
            .map(|s| s.start + base..s.end + base)
            .collect()
    });

    let mut chunks: Vec<TextChunk> = Vec::with_capacity(windows.len());
    let mut previous: Option<Range<usize>> = None;

    for window in &windows {
        // Step back into the previous emitted chunk, never to its start, so
        // each chunk begins strictly after the one before it.
        let start = match previous.as_ref() {
            Some(prev) => {
                let step = options.chunk_overlap.min(char_len(text, prev).saturating_sub(1));
                tail_start(text, prev, step)
            }
            None => window.start,
        };

        let span = if options.preserve_whitespace {
            start..window.end
        } else {
            trimmed(text, start..window.end)
        };
        if span.is_empty() || text[span.clone()].trim().is_empty() {
            previous = None;
            continue;
        }
        previous = Some(span.clone());

        let overlap = if span.start < window.start {
            char_len(text, &(span.start..window.start))
        } else {
            0
        };
        chunks.push(TextChunk {
            content: text[span.clone()].to_string(),
            start_index: span.start,
            end_index: span.end,
            metadata: Some(chunk_metadata(chunks.len(), overlap)),
        });
    }

    ChunkResult::new(chunks, original_length)
}
