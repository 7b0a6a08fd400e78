//! Agent trait definition.
//!
//! All LLM-backed roles (classifier, simulator, answerer) implement this
//! trait, which provides a uniform execute path with a per-call timeout.

use std::time::Duration;

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, system_message, user_message};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: super::message::TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all agents in the system.
///
/// Agents encapsulate a specific role with a fixed system prompt and model
/// configuration. Callers use [`Agent::execute`] to run the agent against
/// a provider; the call is bounded by [`Agent::timeout`].
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and timeout diagnostics.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Per-call deadline for this agent.
    fn timeout(&self) -> Duration {
        Duration::from_secs(45)
    }

    /// Executes the agent with the given user message.
    ///
    /// Builds a [`ChatRequest`] from the agent's configuration, delegates
    /// to the provider, and enforces the per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Timeout`] when the deadline elapses, or the
    /// provider's error on API failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
        };

        let deadline = self.timeout();
        let response: ChatResponse = tokio::time::timeout(deadline, provider.chat(&request))
            .await
            .map_err(|_| AgentError::Timeout {
                stage: self.name(),
                secs: deadline.as_secs(),
            })??;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}

/// Strips a markdown code fence from a model response, if present.
///
/// JSON-mode models occasionally wrap output in ```` ```json ```` fences;
/// every strict parser in the crate goes through this first.
#[must_use]
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}
