//! Content-type-aware chunker.
//!
//! Splits a source's text into chunks bounded by `char_count`, with a policy
//! that depends on [`ContentType`]:
//!
//! - **text** prefers paragraph (`\n\n`) boundaries; never splits mid-word.
//! - **code** prefers top-level construct boundaries when detectable
//!   (a line opening a `fn`/`struct`/`impl`/`class`/`def` block at column 0),
//!   otherwise falls back to the same fixed-size-with-overlap split as text.
//! - **media** is treated as plain text — the (out-of-scope) extractor has
//!   already turned it into text by the time it reaches the chunker.
//!
//! This module performs no I/O: it is pure text in, chunks out.

use crate::model::ContentType;
use std::collections::HashSet;

/// One chunk produced by [`chunk_text`], before embedding or persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub text: String,
    pub char_count: i64,
    pub qntm_keys: Vec<String>,
}

const DEFAULT_OVERLAP_CHARS: usize = 80;

/// Split `text` into chunks no larger than `max_chars`, per `content_type`'s
/// policy. Always returns at least one chunk, even for empty text (the
/// single chunk will have `char_count == 0`).
pub fn chunk_text(text: &str, max_chars: usize, content_type: ContentType) -> Vec<RawChunk> {
    let max_chars = max_chars.max(1);

    let pieces: Vec<String> = match content_type {
        ContentType::Text | ContentType::Media => split_paragraphs(text, max_chars),
        ContentType::Code => split_code(text, max_chars),
    };

    let total = pieces.len() as i64;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let qntm_keys = extract_qntm_keys(&piece);
            RawChunk {
                chunk_index: i as i64,
                total_chunks: total,
                char_count: piece.chars().count() as i64,
                qntm_keys,
                text: piece,
            }
        })
        .collect()
}

/// Paragraph-boundary split: accumulate paragraphs until the buffer would
/// exceed `max_chars`, then flush. Oversized single paragraphs are hard-split
/// at the nearest newline/space boundary, never mid-word.
fn split_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut chunks = Vec::new();
    let mut buf = String::new();

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.chars().count()
        } else {
            buf.chars().count() + 2 + trimmed.chars().count()
        };

        if would_be > max_chars && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
        }

        if trimmed.chars().count() > max_chars {
            if !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
            }
            chunks.extend(hard_split(trimmed, max_chars));
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }

    if chunks.is_empty() {
        chunks.push(text.trim().to_string());
    }

    chunks
}

/// Split source code on top-level construct boundaries when detectable
/// (a line at column 0 starting a `fn`/`struct`/`enum`/`impl`/`class`/`def`/
/// `interface` block); otherwise fall back to fixed-size chunks with a
/// small overlap so a construct straddling a boundary isn't cut without
/// context on either side.
fn split_code(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }

    let boundaries = top_level_boundaries(text);
    if boundaries.len() > 1 {
        return split_on_boundaries(text, &boundaries, max_chars);
    }

    fixed_size_with_overlap(text, max_chars, DEFAULT_OVERLAP_CHARS)
}

const CODE_KEYWORDS: &[&str] = &[
    "fn ", "pub fn ", "async fn ", "struct ", "pub struct ", "enum ", "pub enum ", "impl ",
    "impl<", "class ", "def ", "interface ", "function ", "export function ", "export class ",
];

fn top_level_boundaries(text: &str) -> Vec<usize> {
    let mut offsets = vec![0usize];
    let mut pos = 0usize;
    for line in text.split_inclusive('\n') {
        let stripped = line.trim_start();
        let indent = line.len() - stripped.len();
        if indent == 0 && CODE_KEYWORDS.iter().any(|kw| stripped.starts_with(kw)) && pos > 0 {
            offsets.push(pos);
        }
        pos += line.len();
    }
    offsets
}

fn split_on_boundaries(text: &str, boundaries: &[usize], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    for window in boundaries.windows(2) {
        let piece = &text[window[0]..window[1]];
        append_bounded(&mut chunks, piece, max_chars);
    }
    if let Some(&last) = boundaries.last() {
        let piece = &text[last..];
        append_bounded(&mut chunks, piece, max_chars);
    }
    chunks.retain(|c| !c.trim().is_empty());
    if chunks.is_empty() {
        vec![text.trim().to_string()]
    } else {
        chunks
    }
}

fn append_bounded(chunks: &mut Vec<String>, piece: &str, max_chars: usize) {
    if piece.chars().count() <= max_chars {
        chunks.push(piece.to_string());
    } else {
        chunks.extend(fixed_size_with_overlap(piece, max_chars, DEFAULT_OVERLAP_CHARS));
    }
}

/// Fixed-size split with a trailing overlap, snapping to char boundaries.
fn fixed_size_with_overlap(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    let overlap = overlap.min(max_chars.saturating_sub(1));
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        chunks.push(piece);
        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut remaining = text;
    let mut out = Vec::new();
    while !remaining.is_empty() {
        let byte_budget = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let split_at = if byte_budget < remaining.len() {
            remaining[..byte_budget]
                .rfind('\n')
                .or_else(|| remaining[..byte_budget].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(byte_budget)
        } else {
            byte_budget
        };
        let split_at = snap_to_char_boundary(remaining, split_at).max(
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len()),
        );
        let piece = &remaining[..split_at];
        if !piece.trim().is_empty() {
            out.push(piece.trim().to_string());
        }
        remaining = &remaining[split_at..];
    }
    out
}

fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    let index = index.min(s.len());
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "to", "of", "in",
    "on", "for", "with", "as", "by", "at", "this", "that", "it", "from", "not",
];

const MAX_QNTM_KEYS: usize = 8;

/// Heuristically extract semantic tags from chunk text: lowercase alphabetic
/// tokens of length ≥ 4, stopwords removed, de-duplicated, capped.
fn extract_qntm_keys(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let lower = raw.to_lowercase();
        if lower.len() < 4 || lower.chars().all(|c| c.is_numeric()) {
            continue;
        }
        if STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if seen.insert(lower.clone()) {
            keys.push(lower);
        }
        if keys.len() >= MAX_QNTM_KEYS {
            break;
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_one_chunk() {
        let chunks = chunk_text("", 500, ContentType::Text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_count, 0);
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Atlas indexes files.", 500, ContentType::Text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn paragraphs_exceeding_limit_split() {
        let text = "Paragraph one is here.\n\nParagraph two is here.\n\nParagraph three is here.";
        let chunks = chunk_text(text, 30, ContentType::Text);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn never_splits_mid_word_on_hard_split() {
        let long_word_text = "word ".repeat(50);
        let chunks = chunk_text(&long_word_text, 11, ContentType::Text);
        for c in &chunks {
            assert!(!c.text.trim().is_empty());
            assert!(c.text.chars().count() <= 11 || !c.text.contains(' '));
        }
    }

    #[test]
    fn code_splits_on_top_level_fn_boundaries() {
        let code = "fn a() {\n    1\n}\n\nfn b() {\n    2\n}\n\nfn c() {\n    3\n}\n";
        let chunks = chunk_text(code, 12, ContentType::Code);
        assert!(chunks.len() >= 3);
        assert!(chunks[0].text.contains("fn a"));
    }

    #[test]
    fn code_without_detectable_boundaries_falls_back_to_fixed_overlap() {
        let code = "x = 1\ny = 2\nz = 3\n".repeat(10);
        let chunks = chunk_text(&code, 40, ContentType::Code);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn multibyte_utf8_does_not_panic() {
        let text = "héllo wörld ".repeat(20);
        let chunks = chunk_text(&text, 7, ContentType::Text);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn qntm_keys_excludes_stopwords_and_short_tokens() {
        let chunks = chunk_text("The quick brown fox jumps over the lazy dog", 500, ContentType::Text);
        let keys = &chunks[0].qntm_keys;
        assert!(!keys.contains(&"the".to_string()));
        assert!(keys.contains(&"quick".to_string()));
    }

    #[test]
    fn deterministic() {
        let text = "Alpha section.\n\nBeta section.\n\nGamma section.";
        let a = chunk_text(text, 15, ContentType::Text);
        let b = chunk_text(text, 15, ContentType::Text);
        assert_eq!(a, b);
    }
}
