//! Byte-range helpers. Every splitter works on spans of the source text so
//! chunk offsets are exact and strictly forward-moving.

use std::ops::Range;

use kbase_core::Metadata;

pub(crate) fn char_len(text: &str, span: &Range<usize>) -> usize {
    text[span.clone()].chars().count()
}

/// Byte offset where the last `chars` characters of `span` begin.
/// Returns `span.start` when the span is shorter than `chars`.
pub(crate) fn tail_start(text: &str, span: &Range<usize>, chars: usize) -> usize {
    if chars == 0 {
        return span.end;
    }
    text[span.clone()]
        .char_indices()
        .rev()
        .nth(chars - 1)
        .map(|(i, _)| span.start + i)
        .unwrap_or(span.start)
}

/// Shrink `span` to exclude leading and trailing whitespace.
pub(crate) fn trimmed(text: &str, span: Range<usize>) -> Range<usize> {
    let slice = &text[span.clone()];
    let start = span.start + (slice.len() - slice.trim_start().len());
    let end = span.end - (slice.len() - slice.trim_end().len());
    if start >= end {
        start..start
    } else {
        start..end
    }
}

/// Split on `separator`, keeping the separator attached to the preceding
/// piece. The empty separator yields one span per character.
pub(crate) fn pieces(text: &str, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| i..i + c.len_utf8())
            .collect();
    }
    let mut offset = 0;
    text.split_inclusive(separator)
        .map(|piece| {
            let span = offset..offset + piece.len();
            offset = span.end;
            span
        })
        .collect()
}

/// Greedily merge contiguous pieces into spans of at most `max_chars`.
/// Pieces that alone exceed the limit are handed to `split_oversized`.
pub(crate) fn pack<F>(
    text: &str,
    pieces: Vec<Range<usize>>,
    max_chars: usize,
    mut split_oversized: F,
) -> Vec<Range<usize>>
where
    F: FnMut(Range<usize>) -> Vec<Range<usize>>,
{
    let mut out = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut current_len = 0usize;

    for piece in pieces {
        let piece_len = char_len(text, &piece);

        if piece_len > max_chars {
            if let Some(span) = current.take() {
                out.push(span);
            }
            current_len = 0;
            out.extend(split_oversized(piece));
            continue;
        }

        if let Some(span) = current.as_mut() {
            if current_len + piece_len > max_chars {
                out.push(std::mem::replace(span, piece));
                current_len = piece_len;
            } else {
                span.end = piece.end;
                current_len += piece_len;
            }
        } else {
            current = Some(piece);
            current_len = piece_len;
        }
    }

    if let Some(span) = current {
        out.push(span);
    }
    out
}

pub(crate) fn chunk_metadata(index: usize, overlap: usize) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("chunkIndex".into(), index.into());
    meta.insert("overlap".into(), overlap.into());
    meta
}
