//! Knowledge-base ingestion: front-matter policy files to embedded chunks.
//!
//! A policy file is a text document prefixed with a YAML front-matter block:
//!
//! ```text
//! ---
//! doc_id: POLICY_007
//! type: policy
//! category: Amenities
//! building_id: all_buildings
//! version: 2.1.0
//! effective_date: 2025-01-01
//! last_updated: 2025-06-15
//! ---
//! Overnight guests may stay up to 14 nights per quarter...
//! ```
//!
//! Ingestion loads a directory of these files, splits bodies into
//! overlap-aware chunks, embeds each chunk, and atomically rebuilds the
//! vector-store collection.

pub mod chunker;
pub mod frontmatter;
pub mod loader;

pub use chunker::{DocumentChunk, PolicyChunker, chunk_id, parse_chunk_id};
pub use frontmatter::{DocMetadata, DocType, split_front_matter};
pub use loader::{KbDocument, LoadReport, load_directory};

use tracing::info;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::store::{EmbeddedChunk, VectorStore};

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestReport {
    /// Documents parsed successfully.
    pub documents: usize,
    /// Files skipped for lacking a front-matter block.
    pub skipped: usize,
    /// Files rejected for missing required metadata.
    pub failed: usize,
    /// Chunks written to the collection.
    pub chunks: usize,
}

/// Loads `root`, chunks every document, embeds the chunks, and atomically
/// replaces the store's collection with the result.
///
/// Per-file failures do not abort the run: files without front matter are
/// skipped with a warning and files with missing metadata are counted as
/// failed, while the rebuild of the remaining documents is still published.
///
/// # Errors
///
/// Returns an error if the directory cannot be read, embedding fails, or
/// the collection swap fails.
pub fn ingest_directory(
    root: &std::path::Path,
    chunker: &PolicyChunker,
    embedder: &dyn Embedder,
    store: &VectorStore,
) -> Result<IngestReport> {
    let report = load_directory(root)?;

    let mut chunks: Vec<DocumentChunk> = Vec::new();
    for doc in &report.documents {
        chunks.extend(chunker.chunk_document(doc)?);
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.body_text.as_str()).collect();
    let embeddings = embedder.embed_batch(&texts)?;

    let embedded: Vec<EmbeddedChunk> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
        .collect();

    store.rebuild(&embedded)?;

    info!(
        documents = report.documents.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        chunks = embedded.len(),
        "knowledge base ingested"
    );

    Ok(IngestReport {
        documents: report.documents.len(),
        skipped: report.skipped.len(),
        failed: report.failed.len(),
        chunks: embedded.len(),
    })
}
