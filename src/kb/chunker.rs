//! Hierarchy-aware splitting of document bodies into embedding chunks.
//!
//! The splitter prefers paragraph breaks, then sentence boundaries, then
//! raw characters, respecting the configured size and overlap. Defaults
//! target roughly 700 tokens per chunk.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{KbError, Result};

use super::loader::KbDocument;

/// Default chunk size in characters (~700 tokens).
pub const DEFAULT_CHUNK_SIZE_CHARS: usize = 2800;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 480;

/// A chunk of one document's body, ready for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `"{doc_id}:{chunk_index}"`.
    pub chunk_id: String,
    /// Owning document id.
    pub doc_id: String,
    /// 0-based position within the document.
    pub chunk_index: usize,
    /// Number of chunks the document produced.
    pub total_chunks: usize,
    /// Chunk text. Never contains a front-matter block.
    pub body_text: String,
    /// Building scope, copied from the parent document.
    pub building_id: String,
    /// Category, copied from the parent document.
    pub category: String,
    /// Version string, copied from the parent document.
    pub version: String,
    /// Last revision date, copied from the parent document.
    pub last_updated: NaiveDate,
    /// Flat scalar metadata inherited from the parent plus the chunk fields.
    pub metadata: BTreeMap<String, Value>,
}

/// Formats a chunk id from its parts.
#[must_use]
pub fn chunk_id(doc_id: &str, index: usize) -> String {
    format!("{doc_id}:{index}")
}

/// Parses a chunk id back into `(doc_id, index)`. The split is on the last
/// colon so document ids containing `:` round-trip.
#[must_use]
pub fn parse_chunk_id(id: &str) -> Option<(&str, usize)> {
    let (doc_id, idx) = id.rsplit_once(':')?;
    idx.parse().ok().map(|idx| (doc_id, idx))
}

/// Recursive splitter with configurable size and overlap.
#[derive(Debug, Clone)]
pub struct PolicyChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for PolicyChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE_CHARS,
            overlap: DEFAULT_CHUNK_OVERLAP_CHARS,
        }
    }
}

impl PolicyChunker {
    /// Creates a chunker with explicit size and overlap.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::InvalidChunkConfig`] when the size is zero or the
    /// overlap is not strictly smaller than the size.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(KbError::InvalidChunkConfig {
                reason: "chunk_size must be > 0".to_string(),
            }
            .into());
        }
        if overlap >= chunk_size {
            return Err(KbError::InvalidChunkConfig {
                reason: format!("overlap {overlap} must be less than chunk size {chunk_size}"),
            }
            .into());
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Splits a body into chunk texts.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if char_len(trimmed) <= self.chunk_size {
            return vec![trimmed.to_string()];
        }

        // Leaves are capped at size - overlap so that a carried overlap tail
        // can never push a packed chunk past the configured size.
        let leaf_cap = self.chunk_size - self.overlap;
        let mut segments = Vec::new();
        segment_paragraphs(trimmed, leaf_cap.max(1), &mut segments);

        self.pack(&segments)
    }

    /// Packs ordered segments into chunks, carrying the overlap tail of each
    /// emitted chunk into the next.
    fn pack(&self, segments: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for seg in segments {
            let seg_len = char_len(seg);
            if current_len > 0 && current_len + seg_len > self.chunk_size {
                let tail = overlap_tail(&current, self.overlap);
                chunks.push(std::mem::take(&mut current));
                current_len = char_len(&tail);
                current = tail;
            }
            current.push_str(seg);
            current_len += seg_len;
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Chunks a full document, stamping each chunk with the parent's
    /// metadata plus its own `chunk_id`, `chunk_index`, and `total_chunks`.
    ///
    /// # Errors
    ///
    /// Currently infallible for valid configurations; the `Result` mirrors
    /// the rest of the ingestion pipeline.
    pub fn chunk_document(&self, doc: &KbDocument) -> Result<Vec<DocumentChunk>> {
        let bodies = self.split(&doc.body);
        let total = bodies.len();
        let meta = &doc.metadata;

        Ok(bodies
            .into_iter()
            .enumerate()
            .map(|(index, body_text)| {
                let id = chunk_id(&meta.doc_id, index);
                let mut metadata = meta.to_scalar_map();
                metadata.insert("chunk_id".to_string(), Value::from(id.clone()));
                metadata.insert("chunk_index".to_string(), Value::from(index));
                metadata.insert("total_chunks".to_string(), Value::from(total));
                DocumentChunk {
                    chunk_id: id,
                    doc_id: meta.doc_id.clone(),
                    chunk_index: index,
                    total_chunks: total,
                    body_text,
                    building_id: meta.building_id.clone(),
                    category: meta.category.clone(),
                    version: meta.version.clone(),
                    last_updated: meta.last_updated,
                    metadata,
                }
            })
            .collect())
    }
}

/// Splits on paragraph breaks first, recursing into sentences and then raw
/// character windows for anything still over the cap.
fn segment_paragraphs(text: &str, cap: usize, out: &mut Vec<String>) {
    for para in split_keep(text, "\n\n") {
        if char_len(&para) <= cap {
            out.push(para);
        } else {
            segment_sentences(&para, cap, out);
        }
    }
}

fn segment_sentences(text: &str, cap: usize, out: &mut Vec<String>) {
    for sentence in text.split_sentence_bounds() {
        if char_len(sentence) <= cap {
            out.push(sentence.to_string());
        } else {
            segment_chars(sentence, cap, out);
        }
    }
}

fn segment_chars(text: &str, cap: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    for window in chars.chunks(cap) {
        out.push(window.iter().collect());
    }
}

/// Splits `text` at every occurrence of `sep`, keeping the separator
/// attached to the preceding piece so that concatenation reproduces the
/// input exactly.
fn split_keep(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Returns the last `overlap` characters of `s` (char-boundary safe).
fn overlap_tail(s: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(overlap);
    chars[start..].iter().collect()
}
