//! # Domus
//!
//! Decision core for apartment-management resident requests.
//!
//! Domus turns a free-form resident message into either a grounded answer
//! drawn from a policy knowledge base, or a ranked set of priced, timed,
//! policy-scored resolution options with an auditable decision.
//!
//! ## Pipeline
//!
//! - **Classifier**: rule layer with an LLM fallback → {category, urgency,
//!   intent, confidence}
//! - **Knowledge base**: front-matter policy files → overlap-aware chunks →
//!   384-dimensional embeddings in a file-backed collection
//! - **Retriever**: filtered top-K similarity with grounded QA
//! - **Simulator**: LLM option generation with history/recurrence tools
//! - **Decider**: weighted policy scoring with documented tie-breaks

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod history;
pub mod kb;
pub mod retrieval;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{AgentError, Error, KbError, Result, StoreError};

// Re-export core domain types
pub use core::{
    Category, Classification, Decision, Intent, PolicyWeights, ResidentMessage, RiskAssessment,
    RiskLevel, SimulatedOption, Simulation, SimulationStatus, Urgency,
};

// Re-export configuration
pub use config::{CoreConfig, WeightTable};

// Re-export pipeline entry points
pub use agent::{HandleResult, Orchestrator};

// Re-export knowledge-base types
pub use kb::{DocumentChunk, IngestReport, KbDocument, PolicyChunker, ingest_directory};

// Re-export embedding types
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{DIMENSIONS, Embedder, FallbackEmbedder, create_embedder};

// Re-export retrieval and store types
pub use retrieval::{RetrievalResult, RetrievedChunk, Retriever};
pub use store::{EmbeddedChunk, MetadataFilter, VectorStore};
