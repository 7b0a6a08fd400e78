//! Filtered top-K similarity retrieval over the policy collection.
//!
//! Everything here is deterministic: embedding the query, filtering by
//! building and category, thresholding, ordering, and truncation. The
//! LLM-facing grounded-answer step lives in the agent layer.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::core::Category;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::kb::DocumentChunk;
use crate::store::{MetadataFilter, VectorStore};

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Default minimum similarity for a chunk to count as relevant.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// One retrieved chunk with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    /// The matching chunk.
    pub chunk: DocumentChunk,
    /// Cosine-equivalent similarity in [0,1].
    pub similarity: f32,
}

/// Ordered retrieval output, highest similarity first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    /// Matching chunks in descending similarity order.
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    /// Returns `true` when nothing passed the threshold.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Unique document ids present in the result.
    #[must_use]
    pub fn doc_ids(&self) -> BTreeSet<String> {
        self.chunks
            .iter()
            .map(|c| c.chunk.doc_id.clone())
            .collect()
    }

    /// Mean similarity across the result, 0 when empty. Used as the
    /// monotone confidence basis for grounded answers.
    #[must_use]
    pub fn mean_similarity(&self) -> f64 {
        if self.chunks.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.chunks.iter().map(|c| f64::from(c.similarity)).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / self.chunks.len() as f64;
        mean.clamp(0.0, 1.0)
    }
}

/// Deterministic retrieval over a shared store and embedder.
pub struct Retriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    similarity_threshold: f32,
}

impl Retriever {
    /// Creates a retriever with the given defaults.
    #[must_use]
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k,
            similarity_threshold,
        }
    }

    /// Runs a filtered similarity query.
    ///
    /// The metadata filter always admits `all_buildings` chunks alongside
    /// the requested building; `category` optionally narrows further.
    /// Chunks below the similarity threshold are dropped (never padded),
    /// the rest are ordered by descending similarity with ties broken by
    /// (newer version, more recent `last_updated`, lexicographic `doc_id`),
    /// and the list is truncated to the configured top-K.
    ///
    /// # Errors
    ///
    /// Returns an error if query embedding or the store scan fails.
    pub fn retrieve(
        &self,
        query_text: &str,
        category: Option<Category>,
        building_id: &str,
    ) -> Result<RetrievalResult> {
        let query_vector = self.embedder.embed(query_text)?;

        let filter = MetadataFilter {
            building_id: Some(building_id.to_string()),
            category: category.map(|c| c.as_str().to_string()),
        };

        // Over-fetch so thresholding and tie-breaking see every candidate
        // that could land in the final top-K.
        let candidates = self
            .store
            .query(&query_vector, self.top_k.saturating_mul(4).max(self.top_k), &filter)?;

        let mut chunks: Vec<RetrievedChunk> = candidates
            .into_iter()
            .filter(|(_, similarity)| *similarity >= self.similarity_threshold)
            .map(|(chunk, similarity)| RetrievedChunk { chunk, similarity })
            .collect();

        chunks.sort_by(compare_retrieved);
        chunks.truncate(self.top_k);

        debug!(
            query = query_text,
            building = building_id,
            returned = chunks.len(),
            "retrieval complete"
        );
        Ok(RetrievalResult { chunks })
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("top_k", &self.top_k)
            .field("similarity_threshold", &self.similarity_threshold)
            .finish_non_exhaustive()
    }
}

/// Ordering for retrieved chunks: similarity descending, then newer
/// version, then more recent revision date, then lexicographic doc id.
fn compare_retrieved(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| compare_versions(&b.chunk.version, &a.chunk.version))
        .then_with(|| b.chunk.last_updated.cmp(&a.chunk.last_updated))
        .then_with(|| a.chunk.doc_id.cmp(&b.chunk.doc_id))
}

/// Compares version strings: semver where both sides parse, lexicographic
/// otherwise (legacy documents carry non-semver versions).
fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::embedding::{DIMENSIONS, FallbackEmbedder};
    use crate::store::{DEFAULT_COLLECTION, EmbeddedChunk};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn chunk_with(
        doc_id: &str,
        version: &str,
        last_updated: &str,
        building: &str,
    ) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("{doc_id}:0"),
            doc_id: doc_id.to_string(),
            chunk_index: 0,
            total_chunks: 1,
            body_text: format!("policy text for {doc_id}"),
            building_id: building.to_string(),
            category: "Maintenance".to_string(),
            version: version.to_string(),
            last_updated: NaiveDate::parse_from_str(last_updated, "%Y-%m-%d")
                .unwrap_or_default(),
            metadata: BTreeMap::new(),
        }
    }

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMENSIONS];
        v[i % DIMENSIONS] = 1.0;
        v
    }

    /// Embedder that maps any text to the first axis, so every stored
    /// axis-0 chunk scores exactly 1.0 and ties are exercised.
    struct ConstEmbedder;

    impl Embedder for ConstEmbedder {
        fn dimensions(&self) -> usize {
            DIMENSIONS
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(axis(0))
        }
    }

    fn seeded_store(chunks: Vec<(DocumentChunk, Vec<f32>)>) -> (Arc<VectorStore>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let store = VectorStore::open(tmp.path(), DEFAULT_COLLECTION)
            .unwrap_or_else(|e| panic!("open: {e}"));
        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect();
        store.upsert(&embedded).unwrap_or_else(|e| panic!("upsert: {e}"));
        (Arc::new(store), tmp)
    }

    #[test]
    fn test_tie_break_version_then_date_then_doc_id() {
        let (store, _tmp) = seeded_store(vec![
            (chunk_with("DOC_B", "1.0.0", "2025-01-01", "B1"), axis(0)),
            (chunk_with("DOC_A", "1.0.0", "2025-01-01", "B1"), axis(0)),
            (chunk_with("DOC_C", "2.0.0", "2024-01-01", "B1"), axis(0)),
            (chunk_with("DOC_D", "1.0.0", "2025-06-01", "B1"), axis(0)),
        ]);
        let retriever = Retriever::new(store, Arc::new(ConstEmbedder), 10, 0.5);
        let result = retriever
            .retrieve("anything", None, "B1")
            .unwrap_or_else(|e| panic!("retrieve: {e}"));

        let order: Vec<&str> = result.chunks.iter().map(|c| c.chunk.doc_id.as_str()).collect();
        // All similarities equal 1.0: newest version first, then most
        // recent revision, then doc_id.
        assert_eq!(order, vec!["DOC_C", "DOC_D", "DOC_A", "DOC_B"]);
    }

    #[test]
    fn test_threshold_never_pads() {
        let (store, _tmp) = seeded_store(vec![
            (chunk_with("DOC_HIT", "1.0.0", "2025-01-01", "B1"), axis(0)),
            (chunk_with("DOC_MISS", "1.0.0", "2025-01-01", "B1"), axis(3)),
        ]);
        let retriever = Retriever::new(store, Arc::new(ConstEmbedder), 5, 0.5);
        let result = retriever
            .retrieve("anything", None, "B1")
            .unwrap_or_else(|e| panic!("retrieve: {e}"));
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].chunk.doc_id, "DOC_HIT");
        for c in &result.chunks {
            assert!(c.similarity >= 0.5);
        }
    }

    #[test]
    fn test_building_scope() {
        let (store, _tmp) = seeded_store(vec![
            (chunk_with("DOC_GLOBAL", "1.0.0", "2025-01-01", "all_buildings"), axis(0)),
            (chunk_with("DOC_OTHER", "1.0.0", "2025-01-01", "B9"), axis(0)),
        ]);
        let retriever = Retriever::new(store, Arc::new(ConstEmbedder), 5, 0.5);
        let result = retriever
            .retrieve("anything", None, "B1")
            .unwrap_or_else(|e| panic!("retrieve: {e}"));
        let ids = result.doc_ids();
        assert!(ids.contains("DOC_GLOBAL"));
        assert!(!ids.contains("DOC_OTHER"));
    }

    #[test]
    fn test_empty_store_empty_result() {
        let (store, _tmp) = seeded_store(Vec::new());
        let retriever = Retriever::new(store, Arc::new(ConstEmbedder), 5, 0.5);
        let result = retriever
            .retrieve("anything", None, "B1")
            .unwrap_or_else(|e| panic!("retrieve: {e}"));
        assert!(result.is_empty());
        assert!(result.mean_similarity().abs() < f64::EPSILON);
    }

    #[test]
    fn test_top_k_truncation() {
        let chunks: Vec<(DocumentChunk, Vec<f32>)> = (0..8)
            .map(|i| (chunk_with(&format!("DOC_{i}"), "1.0.0", "2025-01-01", "B1"), axis(0)))
            .collect();
        let (store, _tmp) = seeded_store(chunks);
        let retriever = Retriever::new(store, Arc::new(ConstEmbedder), 3, 0.5);
        let result = retriever
            .retrieve("anything", None, "B1")
            .unwrap_or_else(|e| panic!("retrieve: {e}"));
        assert_eq!(result.chunks.len(), 3);
    }

    #[test]
    fn test_mean_similarity_with_fallback_embedder() {
        let embedder = FallbackEmbedder::new(DIMENSIONS);
        let text = "The guest policy allows overnight visitors.";
        let vector = embedder.embed(text).unwrap_or_default();
        let (store, _tmp) = seeded_store(vec![(
            chunk_with("POLICY_007", "1.0.0", "2025-01-01", "all_buildings"),
            vector,
        )]);
        // Query with the exact same text: similarity 1.0 against itself.
        let retriever = Retriever::new(store, Arc::new(FallbackEmbedder::new(DIMENSIONS)), 5, 0.5);
        let result = retriever
            .retrieve(text, None, "B1")
            .unwrap_or_else(|e| panic!("retrieve: {e}"));
        assert!(!result.is_empty());
        assert!(result.mean_similarity() > 0.9);
    }

    #[test]
    fn test_version_fallback_lexicographic() {
        assert_eq!(compare_versions("2.0.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("v2", "v10"), Ordering::Greater); // lexicographic fallback
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
    }
}
