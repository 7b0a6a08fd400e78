//! `FastEmbed`-based semantic embedder.
//!
//! Real semantic embeddings via fastembed-rs. Only available when the
//! `fastembed-embeddings` feature is enabled.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;

use crate::embedding::{DEFAULT_MODEL_ID, DIMENSIONS, Embedder, normalize};
use crate::error::{Result, StoreError};

/// Thread-safe singleton for the embedding model, lazily initialised on
/// first use. The model is a process-lifetime shared resource.
static EMBEDDING_MODEL: OnceLock<std::sync::Mutex<fastembed::TextEmbedding>> = OnceLock::new();

/// `FastEmbed` embedder producing 384-dimensional unit vectors.
///
/// The model is lazily loaded on the first embed call to preserve cold
/// start time. Output is deterministic for a fixed model identifier.
pub struct FastEmbedEmbedder {
    model_id: String,
}

impl FastEmbedEmbedder {
    /// Creates a new `FastEmbed` embedder for a supported model id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmbeddingUnavailable`] for unsupported model
    /// identifiers.
    pub fn new(model_id: &str) -> Result<Self> {
        // Only the MiniLM family is supported; other ids would change the
        // collection dimensionality.
        if model_id != DEFAULT_MODEL_ID {
            return Err(StoreError::EmbeddingUnavailable(format!(
                "unsupported embedding model `{model_id}` (supported: {DEFAULT_MODEL_ID})"
            ))
            .into());
        }
        Ok(Self {
            model_id: model_id.to_string(),
        })
    }

    /// Gets or initializes the embedding model (thread-safe).
    fn get_model() -> Result<&'static std::sync::Mutex<fastembed::TextEmbedding>> {
        if let Some(model) = EMBEDDING_MODEL.get() {
            return Ok(model);
        }

        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            StoreError::EmbeddingUnavailable(format!("failed to load embedding model: {e}"))
        })?;

        // Another thread may have won the race; use whichever is stored.
        let _ = EMBEDDING_MODEL.set(std::sync::Mutex::new(model));
        EMBEDDING_MODEL.get().ok_or_else(|| {
            StoreError::EmbeddingUnavailable("model initialization race".to_string()).into()
        })
    }

    /// Returns the model identifier.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn run_model(texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = Self::get_model()?;
        let mut model = model.lock().map_err(|e| {
            StoreError::EmbeddingUnavailable(format!("failed to lock embedding model: {e}"))
        })?;

        // ONNX runtime can panic on malformed inputs; contain it so one bad
        // chunk cannot take the process down.
        let result = catch_unwind(AssertUnwindSafe(|| model.embed(texts.to_vec(), None)));

        let mut embeddings = result
            .map_err(|panic_info| {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                StoreError::EmbeddingUnavailable(format!("ONNX runtime panic: {panic_msg}"))
            })?
            .map_err(|e| StoreError::EmbeddingUnavailable(format!("embedding failed: {e}")))?;

        for vector in &mut embeddings {
            normalize(vector);
        }
        Ok(embeddings)
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(StoreError::EmbeddingUnavailable(
                "cannot embed empty text".to_string(),
            )
            .into());
        }
        Self::run_model(&[text])?.into_iter().next().ok_or_else(|| {
            StoreError::EmbeddingUnavailable("no embedding returned from model".to_string()).into()
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(StoreError::EmbeddingUnavailable(
                "cannot embed empty text".to_string(),
            )
            .into());
        }
        Self::run_model(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_creation() {
        let embedder = FastEmbedEmbedder::new(DEFAULT_MODEL_ID);
        assert!(embedder.is_ok());
        assert_eq!(
            embedder.map(|e| e.dimensions()).unwrap_or_default(),
            DIMENSIONS
        );
    }

    #[test]
    fn test_unsupported_model_rejected() {
        let result = FastEmbedEmbedder::new("text-embedding-3-large");
        assert!(result.is_err());
    }

    // Integration tests that require model download are marked #[ignore].
    // Run with: cargo test --features fastembed-embeddings -- --ignored

    #[test]
    #[ignore = "requires fastembed model download"]
    fn test_embed_success() {
        let embedder = FastEmbedEmbedder::new(DEFAULT_MODEL_ID).unwrap_or_else(|e| unreachable!("{e}"));
        let result = embedder.embed("What is the guest policy?");
        assert!(result.is_ok());
        assert_eq!(result.unwrap_or_default().len(), DIMENSIONS);
    }

    #[test]
    fn test_embed_empty_fails() {
        let embedder = FastEmbedEmbedder::new(DEFAULT_MODEL_ID).unwrap_or_else(|e| unreachable!("{e}"));
        assert!(embedder.embed("").is_err());
    }

    #[test]
    fn test_embed_batch_empty_list() {
        let embedder = FastEmbedEmbedder::new(DEFAULT_MODEL_ID).unwrap_or_else(|e| unreachable!("{e}"));
        let result = embedder.embed_batch(&[]);
        assert!(result.is_ok());
        assert!(result.unwrap_or_default().is_empty());
    }
}
