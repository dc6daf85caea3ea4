//! Paragraph-boundary text chunker for the semantic index.
//!
//! Splits a document body into [`Chunk`]s that respect a `max_tokens` limit.
//! Splitting occurs on paragraph boundaries (`\n\n`) so related lines stay
//! together; a single oversized paragraph is hard-split at the nearest
//! newline or space. Each chunk carries a SHA-256 of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0. Whitespace-only
/// text yields no chunks.
pub fn chunk_text(document_path: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim_end();
        let trimmed = trimmed.trim_start_matches('\n');
        if trimmed.trim().is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push_chunk(&mut chunks, document_path, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    push_chunk(&mut chunks, document_path, piece);
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push_chunk(&mut chunks, document_path, &current_buf);
    }

    chunks
}

/// Largest char boundary `<= index`, never zero for non-empty input.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        s.char_indices().nth(1).map(|(pos, _)| pos).unwrap_or(s.len())
    } else {
        i
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, document_path: &str, text: &str) {
    let index = chunks.len() as i64;
    chunks.push(make_chunk(document_path, index, text));
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(document_path: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_path: document_path.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: content_hash(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("a.py", "def foo():\n    return 1", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "def foo():\n    return 1");
        assert_eq!(chunks[0].document_path, "a.py");
    }

    #[test]
    fn test_blank_text_no_chunks() {
        assert!(chunk_text("a.py", "", 700).is_empty());
        assert!(chunk_text("a.py", " \n\n \n", 700).is_empty());
    }

    #[test]
    fn test_indentation_preserved() {
        let text = "class A:\n    pass\n\n    # trailing comment";
        let chunks = chunk_text("a.py", text, 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("\n    pass"));
        assert!(chunks[0].text.ends_with("    # trailing comment"));
    }

    #[test]
    fn test_paragraphs_exceed_limit() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text("doc.md", text, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_multibyte_hard_split() {
        let text = "é".repeat(50);
        let chunks = chunk_text("doc.md", &text, 2);
        assert!(chunks.len() > 1);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_deterministic_hashes() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc.md", text, 2);
        let c2 = chunk_text("doc.md", text, 2);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
        }
    }
}
