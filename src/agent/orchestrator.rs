//! Orchestrator: Classifier → Retriever → (Answerer | Simulator → Decider).
//!
//! Sequences the pipeline for one message and packages the result. The
//! pipeline never raises for component failures: categorical errors are
//! converted into an error result with `escalation_required`, and only
//! invalid input surfaces as an `Err`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::core::{
    Classification, Decision, Intent, ResidentMessage, RiskAssessment, Simulation,
};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::history::{HttpRequestStore, RequestStore, StaticRequestStore};
use crate::retrieval::{RetrievalResult, Retriever};
use crate::store::VectorStore;

use super::answer::{Answer, Answerer};
use super::classifier::Classifier;
use super::decider::decide;
use super::prompt::PromptSet;
use super::provider::{LlmProvider, create_provider};
use super::simulator::Simulator;
use super::tools::HistoryTools;

/// Result of handling one resident message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandleResult {
    /// The message was a question; a grounded answer was produced.
    Answered {
        /// The message classification.
        classification: Classification,
        /// The grounded answer.
        answer: Answer,
    },
    /// The message was a problem; options were generated and one chosen.
    Submitted {
        /// The message classification.
        classification: Classification,
        /// The validated simulation.
        simulation: Simulation,
        /// The decider's choice.
        decision: Decision,
    },
    /// A pipeline stage failed categorically; a human must follow up.
    Error {
        /// The classification, when the failure came after classification.
        #[serde(skip_serializing_if = "Option::is_none")]
        classification: Option<Classification>,
        /// Diagnostic naming the failing stage.
        message: String,
        /// Always `true` for error results.
        escalation_required: bool,
    },
}

/// Orchestrates the decision pipeline for resident messages.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    config: CoreConfig,
    retriever: Arc<Retriever>,
    tools: HistoryTools,
    classifier: Classifier,
    simulator: Simulator,
    answerer: Answerer,
}

impl Orchestrator {
    /// Creates an orchestrator over explicit shared resources.
    ///
    /// Prompt templates are loaded from the configured prompt directory,
    /// falling back to compiled-in defaults.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: CoreConfig,
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        request_store: Arc<dyn RequestStore>,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let retriever = Arc::new(Retriever::new(
            store,
            embedder,
            config.rag_top_k,
            config.rag_similarity_threshold,
        ));
        let tools = HistoryTools::new(
            request_store,
            config.tool_timeout,
            config.recurrence_window_days,
        );
        let classifier = Classifier::new(&config, prompts.classifier);
        let simulator = Simulator::new(&config, prompts.simulator);
        let answerer = Answerer::new(&config, prompts.answer);

        Self {
            provider,
            config,
            retriever,
            tools,
            classifier,
            simulator,
            answerer,
        }
    }

    /// Wires the orchestrator from configuration alone: opens the vector
    /// store, loads the embedder, builds the provider, and connects the
    /// request store (a static empty store when none is configured).
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be opened, the embedding
    /// model cannot load, or the provider name is unknown. These are
    /// startup-fatal.
    pub fn from_config(config: CoreConfig) -> Result<Self> {
        let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(&config)?);
        let store = Arc::new(VectorStore::open(
            &config.vector_store_path,
            &config.vector_store_collection,
        )?);
        let embedder: Arc<dyn Embedder> =
            Arc::from(crate::embedding::create_embedder(&config.embedding_model_id)?);
        let request_store: Arc<dyn RequestStore> = match config.request_store_url {
            Some(ref url) => Arc::new(HttpRequestStore::new(url.clone(), config.admin_key.clone())),
            None => Arc::new(StaticRequestStore::default()),
        };
        Ok(Self::new(provider, config, store, embedder, request_store))
    }

    /// Handles one resident message end to end.
    ///
    /// The whole pipeline runs under the configured request deadline; on
    /// breach the result is an error status with `escalation_required`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for messages outside the accepted
    /// length bounds. Every other failure is reported inside the returned
    /// [`HandleResult`].
    pub async fn handle_message(
        &self,
        message: &ResidentMessage,
        building_id: &str,
        risk: RiskAssessment,
    ) -> Result<HandleResult> {
        message.validate()?;

        let deadline = self.config.request_deadline;
        match tokio::time::timeout(deadline, self.run(message, building_id, risk)).await {
            Ok(result) => Ok(result),
            Err(_) => {
                warn!(secs = deadline.as_secs(), "request deadline breached");
                Ok(HandleResult::Error {
                    classification: None,
                    message: format!("request deadline of {}s elapsed", deadline.as_secs()),
                    escalation_required: true,
                })
            }
        }
    }

    async fn run(
        &self,
        message: &ResidentMessage,
        building_id: &str,
        risk: RiskAssessment,
    ) -> HandleResult {
        // Stage 1: classify.
        let classification = match self
            .classifier
            .classify(&*self.provider, &message.message_text)
            .await
        {
            Ok(classification) => classification,
            Err(e) => {
                warn!(error = %e, "classifier failed, routing to human");
                return HandleResult::Error {
                    classification: None,
                    message: format!("classifier: {e}"),
                    escalation_required: true,
                };
            }
        };
        debug!(
            category = %classification.category,
            urgency = %classification.urgency,
            intent = %classification.intent,
            "message classified"
        );

        // Stage 2: retrieve policy context.
        let retrieval = match self.retrieve(message, &classification, building_id).await {
            Ok(retrieval) => retrieval,
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                return HandleResult::Error {
                    classification: Some(classification),
                    message: format!("retrieval: {e}"),
                    escalation_required: true,
                };
            }
        };

        // Stage 3: branch on intent.
        if classification.intent == Intent::AnswerQuestion {
            return match self
                .answerer
                .answer_question(&*self.provider, &retrieval, &message.message_text)
                .await
            {
                Ok(answer) => HandleResult::Answered {
                    classification,
                    answer,
                },
                Err(e) => HandleResult::Error {
                    classification: Some(classification),
                    message: format!("answerer: {e}"),
                    escalation_required: true,
                },
            };
        }

        // Stage 4: simulate options (tools fan out inside).
        let simulation = self
            .simulator
            .simulate(
                &*self.provider,
                &self.tools,
                message,
                &classification,
                risk,
                &retrieval,
            )
            .await;

        if simulation.status == crate::core::SimulationStatus::Error {
            let diagnostics = simulation
                .diagnostics
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            return HandleResult::Error {
                classification: Some(classification),
                message: format!("simulator: {diagnostics}"),
                escalation_required: true,
            };
        }

        // Stage 5: decide.
        let decision = decide(&self.config, &classification, &simulation, &retrieval);

        HandleResult::Submitted {
            classification,
            simulation,
            decision,
        }
    }

    /// Runs retrieval on the blocking pool under the embedding + store
    /// timeouts. Disabled retrieval reports an empty result.
    async fn retrieve(
        &self,
        message: &ResidentMessage,
        classification: &Classification,
        building_id: &str,
    ) -> Result<RetrievalResult> {
        if !self.config.rag_enabled {
            return Ok(RetrievalResult::default());
        }

        let retriever = Arc::clone(&self.retriever);
        let query = message.message_text.clone();
        let category = classification.category;
        let building = building_id.to_string();

        let budget = self.config.embed_timeout + self.config.store_timeout;
        let joined = tokio::time::timeout(
            budget,
            tokio::task::spawn_blocking(move || retriever.retrieve(&query, Some(category), &building)),
        )
        .await
        .map_err(|_| {
            Error::Agent(crate::error::AgentError::Timeout {
                stage: "retrieval",
                secs: budget.as_secs(),
            })
        })?;

        joined.map_err(|e| {
            Error::Agent(crate::error::AgentError::Orchestration {
                message: format!("retrieval task join failed: {e}"),
            })
        })?
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("retriever", &self.retriever)
            .finish_non_exhaustive()
    }
}
