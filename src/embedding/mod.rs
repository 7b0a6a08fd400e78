//! Embedding generation for policy retrieval.
//!
//! Provides 384-dimensional unit vectors via fastembed (when available) or
//! a hash-based fallback for deterministic pseudo-embeddings.
//!
//! # Feature Flags
//!
//! - `fastembed-embeddings`: Enables `FastEmbed` with all-MiniLM-L6-v2 (384 dimensions)
//! - Without the feature: Uses hash-based fallback (deterministic but not semantic)

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::FallbackEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use crate::error::Result;

/// Embedding dimensionality for the all-MiniLM-L6-v2 model family.
///
/// The authoritative constant for the whole crate; the vector store rejects
/// vectors of any other length.
pub const DIMENSIONS: usize = 384;

/// Default embedding model identifier.
pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Trait for embedding generators.
///
/// Implementations must be thread-safe (`Send + Sync`) so ingestion can
/// embed chunk batches in parallel. Returned vectors are L2-normalised:
/// cosine similarity reduces to a dot product downstream.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates a unit-norm embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// The default implementation calls `embed` for each text sequentially.
    /// Implementations may override this for batch optimization.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails for any text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Creates the embedder for the given model identifier.
///
/// - With `fastembed-embeddings`: returns `FastEmbedEmbedder` for supported
///   model ids.
/// - Without: returns the deterministic `FallbackEmbedder` (the id is
///   recorded but does not change behaviour).
///
/// # Errors
///
/// Returns [`crate::error::StoreError::EmbeddingUnavailable`] when the
/// model id is unsupported or initialization fails. This is fatal at
/// startup.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder(model_id: &str) -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FastEmbedEmbedder::new(model_id)?))
}

/// Creates the embedder for the given model identifier.
///
/// Featureless builds always use the hash-based fallback.
///
/// # Errors
///
/// Never fails for the fallback; the `Result` keeps the signature stable
/// across feature combinations.
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder(model_id: &str) -> Result<Box<dyn Embedder>> {
    let _ = model_id;
    Ok(Box::new(FallbackEmbedder::new(DIMENSIONS)))
}

/// Scales a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for val in vector.iter_mut() {
            *val /= magnitude;
        }
    }
}

/// Cosine-equivalent similarity for unit vectors, clamped into [0,1].
///
/// Vectors produced by this module are unit-norm, so the dot product is
/// the cosine; negative cosines map to 0 because the retrieval contract
/// scores similarity on [0,1].
#[must_use]
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(0.0, 1.0)
}
