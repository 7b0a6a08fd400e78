//! Core configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → `DOMUS_*`
//! environment variables → defaults. The decider never consults literal
//! weight or cap values; it reads them from here.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Category, PolicyWeights, Urgency};
use crate::embedding::DEFAULT_MODEL_ID;
use crate::error::AgentError;
use crate::kb::chunker::{DEFAULT_CHUNK_OVERLAP_CHARS, DEFAULT_CHUNK_SIZE_CHARS};
use crate::retrieval::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};
use crate::store::DEFAULT_COLLECTION;

/// Default LLM call timeout in seconds.
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 45;
/// Default embedding call timeout in seconds.
const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 10;
/// Default vector-store call timeout in seconds.
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;
/// Default tool call timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;
/// Default whole-request deadline in seconds.
const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 90;
/// Default recurrence window in days.
const DEFAULT_RECURRENCE_WINDOW_DAYS: i64 = 90;
/// Default classifier response budget.
const DEFAULT_CLASSIFIER_MAX_TOKENS: u32 = 256;
/// Default simulator response budget.
const DEFAULT_SIMULATOR_MAX_TOKENS: u32 = 2048;
/// Default grounded-answer response budget.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 1024;

/// Per-urgency policy weight table.
///
/// High urgency favours turnaround (time + urgency alignment); low urgency
/// favours cost and satisfaction; medium sits between.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightTable {
    /// Weights applied to high-urgency requests.
    pub high: PolicyWeights,
    /// Weights applied to medium-urgency requests.
    pub medium: PolicyWeights,
    /// Weights applied to low-urgency requests.
    pub low: PolicyWeights,
}

impl WeightTable {
    /// Returns the (unnormalised) weights for an urgency level.
    #[must_use]
    pub const fn for_urgency(&self, urgency: Urgency) -> PolicyWeights {
        match urgency {
            Urgency::High => self.high,
            Urgency::Medium => self.medium,
            Urgency::Low => self.low,
        }
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            high: PolicyWeights {
                cost: 0.10,
                time: 0.35,
                satisfaction: 0.15,
                urgency_alignment: 0.30,
                policy_compliance: 0.10,
            },
            medium: PolicyWeights::default(),
            low: PolicyWeights {
                cost: 0.35,
                time: 0.10,
                satisfaction: 0.30,
                urgency_alignment: 0.10,
                policy_compliance: 0.15,
            },
        }
    }
}

/// Builds the default per-category cost caps (USD).
fn default_cost_caps() -> BTreeMap<Category, f64> {
    BTreeMap::from([
        (Category::Maintenance, 500.0),
        (Category::Billing, 200.0),
        (Category::Security, 400.0),
        (Category::Deliveries, 100.0),
        (Category::Amenities, 300.0),
    ])
}

/// Builds the default per-urgency time caps (hours).
fn default_time_caps() -> BTreeMap<Urgency, f64> {
    BTreeMap::from([
        (Urgency::High, 4.0),
        (Urgency::Medium, 24.0),
        (Urgency::Low, 72.0),
    ])
}

/// Configuration for the decision core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Whether retrieval is enabled. Disabled, the retriever reports empty
    /// results and the pipeline degrades accordingly.
    pub rag_enabled: bool,
    /// Directory holding vector-store collections.
    pub vector_store_path: PathBuf,
    /// Collection name within the store directory.
    pub vector_store_collection: String,
    /// Embedding model identifier.
    pub embedding_model_id: String,
    /// Maximum chunks returned per retrieval.
    pub rag_top_k: usize,
    /// Minimum similarity for a chunk to count as relevant.
    pub rag_similarity_threshold: f32,
    /// Chunk size in characters.
    pub chunk_size_chars: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap_chars: usize,
    /// LLM provider name (e.g. "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (proxies, compatible APIs).
    pub base_url: Option<String>,
    /// Model used for classification, simulation, and answers.
    pub llm_model_id: String,
    /// Per-call LLM timeout.
    pub llm_timeout: Duration,
    /// Per-call embedding timeout.
    pub embed_timeout: Duration,
    /// Per-call vector-store timeout.
    pub store_timeout: Duration,
    /// Per-call tool timeout.
    pub tool_timeout: Duration,
    /// Whole-request deadline.
    pub request_deadline: Duration,
    /// Window for the recurring-issue signal, in days.
    pub recurrence_window_days: i64,
    /// Response budget for the classifier.
    pub classifier_max_tokens: u32,
    /// Response budget for the simulator.
    pub simulator_max_tokens: u32,
    /// Response budget for grounded answers.
    pub answer_max_tokens: u32,
    /// Per-urgency policy weights.
    pub policy_weights: WeightTable,
    /// Per-category cost caps (USD) for the cost sub-score.
    pub cost_caps: BTreeMap<Category, f64>,
    /// Per-urgency time caps (hours) for the time sub-score.
    pub time_caps: BTreeMap<Urgency, f64>,
    /// Base URL of the external request store, if any.
    pub request_store_url: Option<String>,
    /// Shared admin key for gated request-store endpoints.
    pub admin_key: Option<String>,
    /// Text returned when a question has no supporting documents.
    pub not_found_message: String,
    /// Directory containing prompt template overrides.
    pub prompt_dir: Option<PathBuf>,
}

impl CoreConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Cost cap for a category. Categories absent from the table fall back
    /// to the most permissive configured cap.
    #[must_use]
    pub fn cost_cap(&self, category: Category) -> f64 {
        self.cost_caps.get(&category).copied().unwrap_or_else(|| {
            self.cost_caps
                .values()
                .copied()
                .fold(f64::NAN, f64::max)
                .max(1.0)
        })
    }

    /// Time cap in hours for an urgency level.
    #[must_use]
    pub fn time_cap(&self, urgency: Urgency) -> f64 {
        self.time_caps.get(&urgency).copied().unwrap_or(24.0)
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    rag_enabled: Option<bool>,
    vector_store_path: Option<PathBuf>,
    vector_store_collection: Option<String>,
    embedding_model_id: Option<String>,
    rag_top_k: Option<usize>,
    rag_similarity_threshold: Option<f32>,
    chunk_size_chars: Option<usize>,
    chunk_overlap_chars: Option<usize>,
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    llm_model_id: Option<String>,
    llm_timeout: Option<Duration>,
    embed_timeout: Option<Duration>,
    store_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
    request_deadline: Option<Duration>,
    recurrence_window_days: Option<i64>,
    classifier_max_tokens: Option<u32>,
    simulator_max_tokens: Option<u32>,
    answer_max_tokens: Option<u32>,
    policy_weights: Option<WeightTable>,
    cost_caps: Option<BTreeMap<Category, f64>>,
    time_caps: Option<BTreeMap<Urgency, f64>>,
    request_store_url: Option<String>,
    admin_key: Option<String>,
    not_found_message: Option<String>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_json<T: serde::de::DeserializeOwned>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|v| serde_json::from_str(&v).ok())
}

impl CoreConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    #[allow(clippy::cognitive_complexity)]
    pub fn from_env(mut self) -> Self {
        if self.rag_enabled.is_none() {
            self.rag_enabled = env_parse("DOMUS_RAG_ENABLED");
        }
        if self.vector_store_path.is_none() {
            self.vector_store_path = std::env::var("DOMUS_VECTOR_STORE_PATH")
                .ok()
                .map(PathBuf::from);
        }
        if self.vector_store_collection.is_none() {
            self.vector_store_collection = std::env::var("DOMUS_VECTOR_STORE_COLLECTION").ok();
        }
        if self.embedding_model_id.is_none() {
            self.embedding_model_id = std::env::var("DOMUS_EMBEDDING_MODEL_ID").ok();
        }
        if self.rag_top_k.is_none() {
            self.rag_top_k = env_parse("DOMUS_RAG_TOP_K");
        }
        if self.rag_similarity_threshold.is_none() {
            self.rag_similarity_threshold = env_parse("DOMUS_RAG_SIMILARITY_THRESHOLD");
        }
        if self.chunk_size_chars.is_none() {
            self.chunk_size_chars = env_parse("DOMUS_CHUNK_SIZE_CHARS");
        }
        if self.chunk_overlap_chars.is_none() {
            self.chunk_overlap_chars = env_parse("DOMUS_CHUNK_OVERLAP_CHARS");
        }
        if self.provider.is_none() {
            self.provider = std::env::var("DOMUS_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("DOMUS_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("DOMUS_BASE_URL"))
                .ok();
        }
        if self.llm_model_id.is_none() {
            self.llm_model_id = std::env::var("DOMUS_LLM_MODEL_ID").ok();
        }
        if self.llm_timeout.is_none() {
            self.llm_timeout = env_parse("DOMUS_LLM_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.embed_timeout.is_none() {
            self.embed_timeout = env_parse("DOMUS_EMBED_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.store_timeout.is_none() {
            self.store_timeout = env_parse("DOMUS_STORE_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.tool_timeout.is_none() {
            self.tool_timeout = env_parse("DOMUS_TOOL_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.request_deadline.is_none() {
            self.request_deadline =
                env_parse("DOMUS_REQUEST_DEADLINE_SECS").map(Duration::from_secs);
        }
        if self.recurrence_window_days.is_none() {
            self.recurrence_window_days = env_parse("DOMUS_RECURRENCE_WINDOW_DAYS");
        }
        if self.policy_weights.is_none() {
            self.policy_weights = env_json("DOMUS_POLICY_WEIGHTS");
        }
        if self.cost_caps.is_none() {
            self.cost_caps = env_json("DOMUS_COST_CAPS");
        }
        if self.time_caps.is_none() {
            self.time_caps = env_json("DOMUS_TIME_CAPS");
        }
        if self.request_store_url.is_none() {
            self.request_store_url = std::env::var("DOMUS_REQUEST_STORE_URL").ok();
        }
        if self.admin_key.is_none() {
            self.admin_key = std::env::var("DOMUS_ADMIN_KEY").ok();
        }
        if self.not_found_message.is_none() {
            self.not_found_message = std::env::var("DOMUS_NOT_FOUND_MESSAGE").ok();
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("DOMUS_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets whether retrieval is enabled.
    #[must_use]
    pub const fn rag_enabled(mut self, enabled: bool) -> Self {
        self.rag_enabled = Some(enabled);
        self
    }

    /// Sets the vector-store directory.
    #[must_use]
    pub fn vector_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vector_store_path = Some(path.into());
        self
    }

    /// Sets the collection name.
    #[must_use]
    pub fn vector_store_collection(mut self, name: impl Into<String>) -> Self {
        self.vector_store_collection = Some(name.into());
        self
    }

    /// Sets the embedding model id.
    #[must_use]
    pub fn embedding_model_id(mut self, id: impl Into<String>) -> Self {
        self.embedding_model_id = Some(id.into());
        self
    }

    /// Sets the retrieval top-K.
    #[must_use]
    pub const fn rag_top_k(mut self, k: usize) -> Self {
        self.rag_top_k = Some(k);
        self
    }

    /// Sets the similarity threshold.
    #[must_use]
    pub const fn rag_similarity_threshold(mut self, threshold: f32) -> Self {
        self.rag_similarity_threshold = Some(threshold);
        self
    }

    /// Sets the chunk size in characters.
    #[must_use]
    pub const fn chunk_size_chars(mut self, size: usize) -> Self {
        self.chunk_size_chars = Some(size);
        self
    }

    /// Sets the chunk overlap in characters.
    #[must_use]
    pub const fn chunk_overlap_chars(mut self, overlap: usize) -> Self {
        self.chunk_overlap_chars = Some(overlap);
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the LLM model id.
    #[must_use]
    pub fn llm_model_id(mut self, model: impl Into<String>) -> Self {
        self.llm_model_id = Some(model.into());
        self
    }

    /// Sets the per-call LLM timeout.
    #[must_use]
    pub const fn llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = Some(timeout);
        self
    }

    /// Sets the per-call tool timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Sets the whole-request deadline.
    #[must_use]
    pub const fn request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = Some(deadline);
        self
    }

    /// Sets the recurrence window in days.
    #[must_use]
    pub const fn recurrence_window_days(mut self, days: i64) -> Self {
        self.recurrence_window_days = Some(days);
        self
    }

    /// Sets the policy weight table.
    #[must_use]
    pub const fn policy_weights(mut self, weights: WeightTable) -> Self {
        self.policy_weights = Some(weights);
        self
    }

    /// Sets the per-category cost caps.
    #[must_use]
    pub fn cost_caps(mut self, caps: BTreeMap<Category, f64>) -> Self {
        self.cost_caps = Some(caps);
        self
    }

    /// Sets the per-urgency time caps.
    #[must_use]
    pub fn time_caps(mut self, caps: BTreeMap<Urgency, f64>) -> Self {
        self.time_caps = Some(caps);
        self
    }

    /// Sets the request-store base URL.
    #[must_use]
    pub fn request_store_url(mut self, url: impl Into<String>) -> Self {
        self.request_store_url = Some(url.into());
        self
    }

    /// Sets the shared admin key.
    #[must_use]
    pub fn admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin_key = Some(key.into());
        self
    }

    /// Sets the not-found sentinel text.
    #[must_use]
    pub fn not_found_message(mut self, message: impl Into<String>) -> Self {
        self.not_found_message = Some(message.into());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`CoreConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<CoreConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        Ok(CoreConfig {
            rag_enabled: self.rag_enabled.unwrap_or(true),
            vector_store_path: self
                .vector_store_path
                .unwrap_or_else(|| PathBuf::from("./vector_store")),
            vector_store_collection: self
                .vector_store_collection
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            embedding_model_id: self
                .embedding_model_id
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            rag_top_k: self.rag_top_k.unwrap_or(DEFAULT_TOP_K),
            rag_similarity_threshold: self
                .rag_similarity_threshold
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
            chunk_size_chars: self.chunk_size_chars.unwrap_or(DEFAULT_CHUNK_SIZE_CHARS),
            chunk_overlap_chars: self
                .chunk_overlap_chars
                .unwrap_or(DEFAULT_CHUNK_OVERLAP_CHARS),
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            llm_model_id: self
                .llm_model_id
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            llm_timeout: self
                .llm_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS)),
            embed_timeout: self
                .embed_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_EMBED_TIMEOUT_SECS)),
            store_timeout: self
                .store_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS)),
            tool_timeout: self
                .tool_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            request_deadline: self
                .request_deadline
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_DEADLINE_SECS)),
            recurrence_window_days: self
                .recurrence_window_days
                .unwrap_or(DEFAULT_RECURRENCE_WINDOW_DAYS),
            classifier_max_tokens: self
                .classifier_max_tokens
                .unwrap_or(DEFAULT_CLASSIFIER_MAX_TOKENS),
            simulator_max_tokens: self
                .simulator_max_tokens
                .unwrap_or(DEFAULT_SIMULATOR_MAX_TOKENS),
            answer_max_tokens: self.answer_max_tokens.unwrap_or(DEFAULT_ANSWER_MAX_TOKENS),
            policy_weights: self.policy_weights.unwrap_or_default(),
            cost_caps: self.cost_caps.unwrap_or_else(default_cost_caps),
            time_caps: self.time_caps.unwrap_or_else(default_time_caps),
            request_store_url: self.request_store_url,
            admin_key: self.admin_key,
            not_found_message: self.not_found_message.unwrap_or_else(|| {
                "I do not know. No supporting policy documents were found for this question."
                    .to_string()
            }),
            prompt_dir: self.prompt_dir,
        })
    }
}
