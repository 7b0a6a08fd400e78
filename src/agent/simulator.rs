//! Simulator: LLM-backed generation of candidate resolution options.
//!
//! One generation runs `prompted → parsed_ok → validated_ok → returned`,
//! with a single re-request allowed on a parse failure. Tool results
//! (history, recurrence) are gathered in parallel before the prompt is
//! built; options are never emitted before both tools have returned or
//! timed out.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::core::{Classification, ResidentMessage, RiskAssessment, SimulatedOption, Simulation, SimulationStatus};
use crate::error::AgentError;
use crate::retrieval::RetrievalResult;

use super::prompt::build_simulator_prompt;
use super::provider::LlmProvider;
use super::tools::{HistoryTools, ToolContext};
use super::traits::{Agent, strip_code_fence};

/// Minimum options per simulation.
const MIN_OPTIONS: usize = 3;
/// Maximum options per simulation.
const MAX_OPTIONS: usize = 4;

/// Raw option shape required from the model.
#[derive(Debug, Deserialize)]
struct RawOption {
    action: String,
    #[serde(default)]
    steps: Vec<String>,
    estimated_cost: f64,
    estimated_time: f64,
    resident_satisfaction_impact: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    source_doc_ids: Vec<String>,
}

/// Raw simulation wrapper required from the model.
#[derive(Debug, Deserialize)]
struct RawSimulation {
    options: Vec<RawOption>,
    #[serde(default)]
    recommended_index: Option<usize>,
}

/// LLM-backed option generator.
pub struct Simulator {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl Simulator {
    /// Creates a simulator from configuration and a system prompt.
    #[must_use]
    pub fn new(config: &CoreConfig, system_prompt: String) -> Self {
        Self {
            model: config.llm_model_id.clone(),
            max_tokens: config.simulator_max_tokens,
            timeout: config.llm_timeout,
            system_prompt,
        }
    }

    /// Generates 3-4 validated options for a classified request.
    ///
    /// Never fails outright: LLM failures (timeout, non-parseable response
    /// after the single retry) yield a simulation holding one escalation
    /// option with `status = Error`, which the orchestrator converts into
    /// an error result.
    pub async fn simulate(
        &self,
        provider: &dyn LlmProvider,
        tools: &HistoryTools,
        message: &ResidentMessage,
        classification: &Classification,
        risk: RiskAssessment,
        retrieval: &RetrievalResult,
    ) -> Simulation {
        // Parallel tool fan-out; options are only generated once both
        // results (or their timeouts) are in.
        let context = tools.gather(&message.resident_id, classification.category).await;

        let prompt = build_simulator_prompt(
            message,
            classification,
            risk,
            &retrieval.chunks,
            &context.history,
            &context.recurrence,
        );

        let raw = match self.generate(provider, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "simulation degraded to escalation");
                return escalation_simulation(format!("option generation failed: {e}"));
            }
        };

        validate(raw, retrieval, &context)
    }

    /// Executes the model and parses the option JSON, re-requesting once
    /// with the error described on a parse failure.
    async fn generate(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
    ) -> Result<RawSimulation, AgentError> {
        let response = self.execute(provider, prompt).await?;
        let first_error = match parse_simulation(&response.content) {
            Ok(raw) => return Ok(raw),
            Err(e) => e,
        };

        let retry_prompt = format!(
            "{prompt}\n\nYour previous response could not be parsed: {first_error}. \
             Return ONLY the JSON object with an `options` array as documented."
        );
        let retry = self.execute(provider, &retry_prompt).await?;
        parse_simulation(&retry.content).map_err(|e| AgentError::Simulation {
            message: format!("unparseable after retry: {e}"),
        })
    }
}

#[async_trait]
impl Agent for Simulator {
    fn name(&self) -> &'static str {
        "simulator"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
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

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

fn parse_simulation(content: &str) -> Result<RawSimulation, AgentError> {
    let json_str = strip_code_fence(content);
    serde_json::from_str::<RawSimulation>(json_str).map_err(|e| AgentError::ResponseParse {
        message: format!("invalid simulation JSON: {e}"),
        content: content.to_string(),
    })
}

/// Builds the single-option escalation simulation used on hard failure.
fn escalation_simulation(diagnostic: String) -> Simulation {
    Simulation {
        options: vec![SimulatedOption::escalation("opt_1", diagnostic.clone())],
        recommended_option_id: "opt_1".to_string(),
        status: SimulationStatus::Error,
        diagnostics: Some(diagnostic),
    }
}

/// Validates, repairs, and normalises parsed options.
///
/// - ids are assigned in the model's emitted order (its internal ranking);
/// - out-of-range cost/time/satisfaction values are clamped and flagged;
/// - citations absent from the retrieval are stripped and flagged;
/// - tool degradation notes are appended to every option's reasoning;
/// - the option count is normalised into [3,4]: excess options are
///   truncated from the tail, a shortfall is padded with escalation
///   sentinels.
fn validate(raw: RawSimulation, retrieval: &RetrievalResult, context: &ToolContext) -> Simulation {
    let retrieved_ids = retrieval.doc_ids();
    let mut options: Vec<SimulatedOption> = Vec::new();

    for (i, raw_option) in raw.options.into_iter().take(MAX_OPTIONS).enumerate() {
        let option_id = format!("opt_{}", i + 1);
        let mut flags = Vec::new();

        let estimated_cost = if raw_option.estimated_cost < 0.0 {
            flags.push("estimated_cost clamped to 0".to_string());
            0.0
        } else {
            raw_option.estimated_cost
        };
        let estimated_time = if raw_option.estimated_time < 0.0 {
            flags.push("estimated_time clamped to 0".to_string());
            0.0
        } else {
            raw_option.estimated_time
        };
        let satisfaction = raw_option.resident_satisfaction_impact;
        let resident_satisfaction_impact = if (0.0..=1.0).contains(&satisfaction) {
            satisfaction
        } else {
            flags.push("resident_satisfaction_impact clamped to [0,1]".to_string());
            satisfaction.clamp(0.0, 1.0)
        };

        // Citations must come from this request's retrieval; dedupe and
        // strip anything else.
        let mut source_doc_ids: Vec<String> = Vec::new();
        for doc_id in raw_option.source_doc_ids {
            if !retrieved_ids.contains(&doc_id) {
                flags.push(format!("citation {doc_id} not in retrieval, stripped"));
            } else if !source_doc_ids.contains(&doc_id) {
                source_doc_ids.push(doc_id);
            }
        }
        if source_doc_ids.is_empty() {
            flags.push("no policy citations".to_string());
        }

        let mut reasoning = raw_option.reasoning;
        for note in &context.notes {
            reasoning.push_str(&format!(" ({note})"));
        }

        options.push(SimulatedOption {
            option_id,
            action: raw_option.action,
            steps: raw_option.steps,
            estimated_cost,
            estimated_time,
            resident_satisfaction_impact,
            reasoning,
            source_doc_ids,
            flags,
            escalation: false,
        });
    }

    // Pad a shortfall with escalation sentinels so the count invariant
    // holds even for a thin model response.
    while options.len() < MIN_OPTIONS {
        let option_id = format!("opt_{}", options.len() + 1);
        options.push(SimulatedOption::escalation(
            option_id,
            "insufficient options generated, human follow-up required",
        ));
    }

    let recommended_option_id = raw
        .recommended_index
        .and_then(|i| options.get(i))
        .map_or_else(|| options[0].option_id.clone(), |o| o.option_id.clone());

    debug!(options = options.len(), "simulation validated");
    Simulation {
        options,
        recommended_option_id,
        status: SimulationStatus::Ok,
        diagnostics: None,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::prompt::SIMULATOR_SYSTEM_PROMPT;
    use crate::agent::traits::tests::ScriptedProvider;
    use crate::core::{Category, Intent, Urgency};
    use crate::history::StaticRequestStore;
    use crate::kb::DocumentChunk;
    use crate::retrieval::RetrievedChunk;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn retrieval_with(doc_ids: &[&str]) -> RetrievalResult {
        RetrievalResult {
            chunks: doc_ids
                .iter()
                .map(|doc_id| RetrievedChunk {
                    chunk: DocumentChunk {
                        chunk_id: format!("{doc_id}:0"),
                        doc_id: (*doc_id).to_string(),
                        chunk_index: 0,
                        total_chunks: 1,
                        body_text: format!("text of {doc_id}"),
                        building_id: "all_buildings".to_string(),
                        category: "Maintenance".to_string(),
                        version: "1.0.0".to_string(),
                        last_updated: NaiveDate::default(),
                        metadata: BTreeMap::new(),
                    },
                    similarity: 0.8,
                })
                .collect(),
        }
    }

    fn classification() -> Classification {
        Classification {
            category: Category::Maintenance,
            urgency: Urgency::High,
            intent: Intent::SolveProblem,
            confidence: 0.9,
        }
    }

    fn simulator() -> Simulator {
        let config = CoreConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|e| panic!("config: {e}"));
        Simulator::new(&config, SIMULATOR_SYSTEM_PROMPT.to_string())
    }

    fn tools() -> HistoryTools {
        HistoryTools::new(
            Arc::new(StaticRequestStore::default()),
            Duration::from_secs(10),
            90,
        )
    }

    const THREE_OPTIONS: &str = r#"{
        "options": [
            {"action": "Dispatch emergency HVAC technician", "steps": ["Create work order", "Dispatch"], "estimated_cost": 250.0, "estimated_time": 3.0, "resident_satisfaction_impact": 0.9, "reasoning": "Emergency SLA applies", "source_doc_ids": ["SLA_001"]},
            {"action": "Schedule next-day repair", "steps": ["Create work order"], "estimated_cost": 150.0, "estimated_time": 24.0, "resident_satisfaction_impact": 0.6, "reasoning": "Standard turnaround", "source_doc_ids": ["POLICY_002"]},
            {"action": "Provide portable AC unit", "steps": ["Deliver unit"], "estimated_cost": 80.0, "estimated_time": 2.0, "resident_satisfaction_impact": 0.7, "reasoning": "Stopgap per catalog", "source_doc_ids": ["SLA_001", "POLICY_002"]}
        ],
        "recommended_index": 0
    }"#;

    #[tokio::test]
    async fn test_simulate_happy_path() {
        let provider = ScriptedProvider::new(vec![THREE_OPTIONS]);
        let message = ResidentMessage::new("RES_1", "AC broken, 95 degrees outside");
        let sim = simulator()
            .simulate(
                &provider,
                &tools(),
                &message,
                &classification(),
                RiskAssessment::default(),
                &retrieval_with(&["SLA_001", "POLICY_002"]),
            )
            .await;

        assert_eq!(sim.status, SimulationStatus::Ok);
        assert_eq!(sim.options.len(), 3);
        assert_eq!(sim.recommended_option_id, "opt_1");
        let ids: Vec<&str> = sim.options.iter().map(|o| o.option_id.as_str()).collect();
        assert_eq!(ids, vec!["opt_1", "opt_2", "opt_3"]);
        assert!(sim.options.iter().all(|o| o.flags.is_empty()));
        // At least one option inside the High urgency cap
        assert!(sim.options.iter().any(|o| o.estimated_time <= 4.0));
    }

    #[tokio::test]
    async fn test_simulate_strips_uncited_docs_and_clamps() {
        let response = r#"{
            "options": [
                {"action": "A", "steps": [], "estimated_cost": -50.0, "estimated_time": 2.0, "resident_satisfaction_impact": 1.4, "reasoning": "r", "source_doc_ids": ["SLA_001", "GHOST_DOC"]},
                {"action": "B", "steps": [], "estimated_cost": 10.0, "estimated_time": -1.0, "resident_satisfaction_impact": 0.5, "reasoning": "r", "source_doc_ids": ["SLA_001"]},
                {"action": "C", "steps": [], "estimated_cost": 10.0, "estimated_time": 1.0, "resident_satisfaction_impact": 0.5, "reasoning": "r", "source_doc_ids": []}
            ]
        }"#;
        let provider = ScriptedProvider::new(vec![response]);
        let message = ResidentMessage::new("RES_1", "AC broken again today");
        let sim = simulator()
            .simulate(
                &provider,
                &tools(),
                &message,
                &classification(),
                RiskAssessment::default(),
                &retrieval_with(&["SLA_001"]),
            )
            .await;

        let opt1 = &sim.options[0];
        assert!(opt1.estimated_cost.abs() < f64::EPSILON);
        assert!((opt1.resident_satisfaction_impact - 1.0).abs() < f64::EPSILON);
        assert_eq!(opt1.source_doc_ids, vec!["SLA_001"]);
        assert!(opt1.flags.iter().any(|f| f.contains("GHOST_DOC")));
        assert!(opt1.flags.iter().any(|f| f.contains("estimated_cost")));

        let opt2 = &sim.options[1];
        assert!(opt2.estimated_time.abs() < f64::EPSILON);

        let opt3 = &sim.options[2];
        assert!(opt3.flags.iter().any(|f| f.contains("no policy citations")));
        // Every surviving citation is in the retrieval
        let retrieved = retrieval_with(&["SLA_001"]).doc_ids();
        for option in &sim.options {
            for doc_id in &option.source_doc_ids {
                assert!(retrieved.contains(doc_id));
            }
        }
    }

    #[tokio::test]
    async fn test_simulate_pads_to_three() {
        let response = r#"{
            "options": [
                {"action": "Only option", "steps": [], "estimated_cost": 10.0, "estimated_time": 1.0, "resident_satisfaction_impact": 0.5, "reasoning": "r", "source_doc_ids": ["SLA_001"]}
            ]
        }"#;
        let provider = ScriptedProvider::new(vec![response]);
        let message = ResidentMessage::new("RES_1", "AC broken again today");
        let sim = simulator()
            .simulate(
                &provider,
                &tools(),
                &message,
                &classification(),
                RiskAssessment::default(),
                &retrieval_with(&["SLA_001"]),
            )
            .await;
        assert_eq!(sim.options.len(), 3);
        assert!(sim.options[1].escalation);
        assert!(sim.options[2].escalation);
        assert_eq!(sim.status, SimulationStatus::Ok);
    }

    #[tokio::test]
    async fn test_simulate_truncates_to_four() {
        let option = r#"{"action": "X", "steps": [], "estimated_cost": 1.0, "estimated_time": 1.0, "resident_satisfaction_impact": 0.5, "reasoning": "r", "source_doc_ids": []}"#;
        let response = format!(
            r#"{{"options": [{option}, {option}, {option}, {option}, {option}, {option}]}}"#
        );
        let provider = ScriptedProvider::new(vec![response.as_str()]);
        let message = ResidentMessage::new("RES_1", "AC broken again today");
        let sim = simulator()
            .simulate(
                &provider,
                &tools(),
                &message,
                &classification(),
                RiskAssessment::default(),
                &retrieval_with(&[]),
            )
            .await;
        assert_eq!(sim.options.len(), 4);
        let ids: Vec<&str> = sim.options.iter().map(|o| o.option_id.as_str()).collect();
        assert_eq!(ids, vec!["opt_1", "opt_2", "opt_3", "opt_4"]);
    }

    #[tokio::test]
    async fn test_simulate_double_parse_failure_escalates() {
        let provider = ScriptedProvider::new(vec!["not json", "also not json"]);
        let message = ResidentMessage::new("RES_1", "AC broken again today");
        let sim = simulator()
            .simulate(
                &provider,
                &tools(),
                &message,
                &classification(),
                RiskAssessment::default(),
                &retrieval_with(&["SLA_001"]),
            )
            .await;
        assert_eq!(sim.status, SimulationStatus::Error);
        assert_eq!(sim.options.len(), 1);
        assert!(sim.options[0].escalation);
        assert!(sim.diagnostics.as_deref().unwrap_or_default().contains("failed"));
    }

    #[tokio::test]
    async fn test_simulate_retry_recovers() {
        let provider = ScriptedProvider::new(vec!["garbage", THREE_OPTIONS]);
        let message = ResidentMessage::new("RES_1", "AC broken again today");
        let sim = simulator()
            .simulate(
                &provider,
                &tools(),
                &message,
                &classification(),
                RiskAssessment::default(),
                &retrieval_with(&["SLA_001", "POLICY_002"]),
            )
            .await;
        assert_eq!(sim.status, SimulationStatus::Ok);
        assert_eq!(sim.options.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_recommended_index_falls_back_to_first() {
        let response = r#"{
            "options": [
                {"action": "A", "steps": [], "estimated_cost": 1.0, "estimated_time": 1.0, "resident_satisfaction_impact": 0.5, "reasoning": "r", "source_doc_ids": ["SLA_001"]},
                {"action": "B", "steps": [], "estimated_cost": 1.0, "estimated_time": 1.0, "resident_satisfaction_impact": 0.5, "reasoning": "r", "source_doc_ids": ["SLA_001"]},
                {"action": "C", "steps": [], "estimated_cost": 1.0, "estimated_time": 1.0, "resident_satisfaction_impact": 0.5, "reasoning": "r", "source_doc_ids": ["SLA_001"]}
            ],
            "recommended_index": 12
        }"#;
        let provider = ScriptedProvider::new(vec![response]);
        let message = ResidentMessage::new("RES_1", "AC broken again today");
        let sim = simulator()
            .simulate(
                &provider,
                &tools(),
                &message,
                &classification(),
                RiskAssessment::default(),
                &retrieval_with(&["SLA_001"]),
            )
            .await;
        assert_eq!(sim.recommended_option_id, "opt_1");
    }
}
