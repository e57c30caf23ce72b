//! Recursive character text splitter.
//!
//! Splits text into chunks of at most `chunk_size` characters, carrying up to
//! `chunk_overlap` characters from the end of one chunk into the next. Break
//! points are chosen from an ordered separator list: paragraphs first, then
//! lines, sentence punctuation, commas, words, and finally single characters.
//!
//! Separators stay attached to the start of the piece that follows them, so
//! joining pieces never needs to re-insert anything. Lengths are counted in
//! `char`s, not bytes.
//!
//! Each chunk's id is a SHA-256 of its source and text, which makes chunking
//! deterministic and lets the vector store skip content it already holds.

use std::collections::VecDeque;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use crate::models::{Chunk, LoadedDocument, SOURCE_KEY, UNKNOWN_SOURCE};

/// Separator preference, most to least structural.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", "!", "?", ",", " ", ""];

/// Metadata key holding a chunk's position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Creates a splitter with the default separator list.
    ///
    /// # Errors
    ///
    /// Fails if `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Split raw text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document, producing chunks that inherit the parent's
    /// metadata plus a `chunk_index`. Chunks whose parent has no `source`
    /// are tagged `"unknown"`.
    pub fn split_documents(&self, documents: &[LoadedDocument]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for (index, text) in self.split_text(&doc.text).into_iter().enumerate() {
                let mut metadata = doc.metadata.clone();
                if !metadata.contains_key(SOURCE_KEY) {
                    metadata.insert(SOURCE_KEY.to_string(), UNKNOWN_SOURCE.into());
                }
                metadata.insert(CHUNK_INDEX_KEY.to_string(), index.into());
                let source = metadata
                    .get(SOURCE_KEY)
                    .and_then(|v| v.as_str())
                    .unwrap_or(UNKNOWN_SOURCE);
                chunks.push(Chunk {
                    id: content_hash(source, &text),
                    text,
                    metadata,
                });
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge_pieces(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            out.extend(self.merge_pieces(&fitting));
        }
        out
    }

    /// Greedily pack pieces into chunks, keeping an overlap window.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_trimmed(&window) {
                    chunks.push(chunk);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&window) {
            chunks.push(chunk);
        }
        chunks
    }
}

/// SHA-256 over `source`, a NUL byte, and `text`, hex encoded.
pub fn content_hash(source: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, keeping it at the start of the following piece.
/// An empty separator yields individual characters.
fn split_keep_start<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut prev = 0;
    for (idx, _) in text.match_indices(separator) {
        pieces.push(&text[prev..idx]);
        prev = idx;
    }
    pieces.push(&text[prev..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 20).is_ok());
    }

    #[test]
    fn short_text_is_single_chunk() {
        let splitter = TextSplitter::new(500, 100).unwrap();
        assert_eq!(splitter.split_text("Hello, world!"), vec!["Hello, world!"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = TextSplitter::new(500, 100).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let chunks = splitter.split_text("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn every_chunk_fits_chunk_size() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = format!(
            "{}\n\n{}. {}\n{}",
            words(40),
            words(15),
            "x".repeat(180),
            words(25)
        );
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 3);
        for c in &chunks {
            assert!(c.chars().count() <= 50, "chunk too long: {:?}", c);
        }
    }

    /// Length in chars of the longest suffix of `a` that is a prefix of `b`.
    fn shared_len(a: &str, b: &str) -> usize {
        b.char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .filter(|&end| a.ends_with(&b[..end]))
            .map(|end| b[..end].chars().count())
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let splitter = TextSplitter::new(60, 20).unwrap();
        let chunks = splitter.split_text(&words(60));
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let shared = shared_len(&pair[0], &pair[1]);
            assert!(
                shared > 0 && shared <= 20,
                "overlap of {} chars between {:?} and {:?}",
                shared,
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn zero_overlap_does_not_repeat_words() {
        let splitter = TextSplitter::new(60, 0).unwrap();
        let chunks = splitter.split_text(&words(60));
        let total: usize = chunks.iter().map(|c| c.split(' ').count()).sum();
        assert_eq!(total, 60);
    }

    #[test]
    fn multibyte_text_counts_chars() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        let chunks = splitter.split_text("äöüäöüäöüäöüäöüäöüäöü");
        for c in &chunks {
            assert!(c.chars().count() <= 10);
        }
        assert!(chunks.len() >= 3);
        assert!(chunks[0].starts_with('ä'));
    }

    #[test]
    fn deterministic() {
        let splitter = TextSplitter::new(40, 10).unwrap();
        let doc = LoadedDocument::new(words(50), "a.txt");
        let a = splitter.split_documents(std::slice::from_ref(&doc));
        let b = splitter.split_documents(std::slice::from_ref(&doc));
        assert_eq!(a, b);
    }

    #[test]
    fn chunks_inherit_metadata_and_index() {
        let splitter = TextSplitter::new(40, 0).unwrap();
        let doc = LoadedDocument::new(words(30), "notes.txt").with_meta("file_type", "txt");
        let chunks = splitter.split_documents(&[doc]);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.source(), "notes.txt");
            assert_eq!(c.metadata["file_type"], "txt");
            assert_eq!(c.metadata[CHUNK_INDEX_KEY], i);
        }
    }

    #[test]
    fn missing_source_defaults_to_unknown() {
        let splitter = TextSplitter::new(40, 0).unwrap();
        let doc = LoadedDocument {
            text: "orphan text".into(),
            metadata: Default::default(),
        };
        let chunks = splitter.split_documents(&[doc]);
        assert_eq!(chunks[0].metadata[SOURCE_KEY], UNKNOWN_SOURCE);
    }

    #[test]
    fn identical_content_shares_id() {
        assert_eq!(content_hash("a.txt", "x"), content_hash("a.txt", "x"));
        assert_ne!(content_hash("a.txt", "x"), content_hash("b.txt", "x"));
    }
}
