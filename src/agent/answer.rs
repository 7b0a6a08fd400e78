//! Grounded question answering over retrieved policy chunks.
//!
//! The model is constrained to the supplied excerpts; with nothing
//! retrieved, the configured not-found text is returned without an LLM
//! call and confidence is 0.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::CoreConfig;
use crate::error::AgentError;
use crate::retrieval::RetrievalResult;

use super::prompt::build_answer_prompt;
use super::provider::LlmProvider;
use super::traits::Agent;

/// Maximum snippet length carried in a citation.
const CITATION_SNIPPET_CHARS: usize = 200;

/// A source document citation.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    /// Cited document id.
    pub doc_id: String,
    /// Short excerpt from the cited chunk.
    pub snippet: String,
}

/// A grounded answer with citations.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Answer text, or the configured not-found sentinel.
    pub text: String,
    /// Citations, deduplicated by `doc_id`, in retrieval order.
    pub sources: Vec<Citation>,
    /// Confidence in [0,1], derived monotonically from the retrieval's
    /// similarity scores. Zero when nothing was retrieved.
    pub confidence: f64,
}

/// LLM-backed answer agent.
pub struct Answerer {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
    not_found_message: String,
}

impl Answerer {
    /// Creates an answerer from configuration and a system prompt.
    #[must_use]
    pub fn new(config: &CoreConfig, system_prompt: String) -> Self {
        Self {
            model: config.llm_model_id.clone(),
            max_tokens: config.answer_max_tokens,
            timeout: config.llm_timeout,
            system_prompt,
            not_found_message: config.not_found_message.clone(),
        }
    }

    /// Answers a question from retrieved chunks.
    ///
    /// # Errors
    ///
    /// Returns provider errors and timeouts; an empty retrieval is not an
    /// error (it produces the not-found answer).
    pub async fn answer_question(
        &self,
        provider: &dyn LlmProvider,
        retrieval: &RetrievalResult,
        question: &str,
    ) -> Result<Answer, AgentError> {
        if retrieval.is_empty() {
            return Ok(Answer {
                text: self.not_found_message.clone(),
                sources: Vec::new(),
                confidence: 0.0,
            });
        }

        let prompt = build_answer_prompt(question, &retrieval.chunks);
        let response = self.execute(provider, &prompt).await?;

        Ok(Answer {
            text: response.content.trim().to_string(),
            sources: citations(retrieval),
            confidence: retrieval.mean_similarity(),
        })
    }
}

#[async_trait]
impl Agent for Answerer {
    fn name(&self) -> &'static str {
        "answerer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.1
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for Answerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Answerer")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Builds citations from a retrieval, one per document, in result order.
fn citations(retrieval: &RetrievalResult) -> Vec<Citation> {
    let mut seen = std::collections::BTreeSet::new();
    retrieval
        .chunks
        .iter()
        .filter(|c| seen.insert(c.chunk.doc_id.clone()))
        .map(|c| Citation {
            doc_id: c.chunk.doc_id.clone(),
            snippet: truncate(&c.chunk.body_text, CITATION_SNIPPET_CHARS),
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        collapsed.chars().take(max_chars).collect()
    }
}
