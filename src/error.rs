//! Error types for the decision core.
//!
//! Components are value-returning at their boundaries: ingestion, retrieval,
//! simulation, and decision all surface typed errors, and only the
//! orchestrator converts categorical failures into an error result for the
//! caller.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Knowledge-base ingestion errors.
    #[error("knowledge base error: {0}")]
    Kb(#[from] KbError),

    /// Vector-store errors.
    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    /// Agent (LLM, classification, simulation) errors.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// A message or field failed input validation. Surfaced verbatim.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the rejected input.
        message: String,
    },

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Ingestion-time errors for knowledge-base files.
#[derive(Error, Debug)]
pub enum KbError {
    /// A document is missing a required front-matter field. Fatal for the
    /// file; ingestion continues for the rest of the directory.
    #[error("missing metadata field `{field}` in {path}")]
    MissingMetadata {
        /// File that failed validation.
        path: PathBuf,
        /// The absent required key.
        field: String,
    },

    /// Front matter was present but did not parse as YAML key/value pairs.
    #[error("malformed front matter in {path}: {reason}")]
    MalformedFrontMatter {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// Invalid chunking configuration.
    #[error("invalid chunker configuration: {reason}")]
    InvalidChunkConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Filesystem failure while reading the knowledge-base tree.
    #[error("failed to read {path}: {reason}")]
    ReadFailed {
        /// Path that could not be read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },
}

/// Vector-store and embedding errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// The embedding model could not be loaded or returned an empty vector.
    /// Fatal at startup; per-query the retriever degrades to empty results.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// An embedding had the wrong dimensionality for the collection.
    #[error("embedding dimension mismatch: got {got}, expected {expected}")]
    DimensionMismatch {
        /// Observed vector length.
        got: usize,
        /// Collection dimensionality.
        expected: usize,
    },

    /// Rebuild could not swap the new collection into place.
    #[error("collection swap failed: {0}")]
    SwapFailed(String),

    /// Serialization/deserialization of stored chunk data failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors from LLM-backed agents and their tools.
#[derive(Error, Debug)]
pub enum AgentError {
    /// No API key was configured for the LLM provider.
    #[error("no API key configured (set OPENAI_API_KEY or DOMUS_API_KEY)")]
    ApiKeyMissing,

    /// Unknown provider name in configuration.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// API request failed (network, auth, server error).
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider diagnostic.
        message: String,
    },

    /// The model response could not be parsed into the expected shape.
    #[error("response parse error: {message}")]
    ResponseParse {
        /// Parse diagnostic, including a preview of the response.
        message: String,
        /// Raw response content for debugging.
        content: String,
    },

    /// Classification failed after the single allowed re-request.
    #[error("classification failed: {message}")]
    Classification {
        /// Diagnostic from the final attempt.
        message: String,
    },

    /// Simulation failed after the single allowed re-request.
    #[error("simulation failed: {message}")]
    Simulation {
        /// Diagnostic from the final attempt.
        message: String,
    },

    /// A per-call or per-request deadline elapsed.
    #[error("timeout after {secs}s in {stage}")]
    Timeout {
        /// Pipeline stage that breached its deadline.
        stage: &'static str,
        /// The configured limit.
        secs: u64,
    },

    /// The request store was unreachable or returned an error. Recovered
    /// locally as "no history available"; never surfaced to the caller.
    #[error("request store unavailable: {message}")]
    ToolUnavailable {
        /// Transport or status diagnostic.
        message: String,
    },

    /// Pipeline sequencing failure outside any single component.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Description of the failure.
        message: String,
    },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
