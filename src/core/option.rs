//! Simulated resolution options.

use serde::{Deserialize, Serialize};

/// Action text used for escalation sentinel options.
pub const ESCALATION_ACTION: &str = "Escalate to a human operator";

/// A candidate resolution emitted by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedOption {
    /// Stable id within one simulation (`opt_1` .. `opt_4`).
    pub option_id: String,
    /// One-sentence summary of the action.
    pub action: String,
    /// Ordered short steps to carry out the action.
    pub steps: Vec<String>,
    /// Estimated cost in USD, >= 0.
    pub estimated_cost: f64,
    /// Estimated time in hours, >= 0.
    pub estimated_time: f64,
    /// Expected impact on resident satisfaction, in [0,1].
    pub resident_satisfaction_impact: f64,
    /// Why the simulator proposed this option.
    pub reasoning: String,
    /// Knowledge-base documents justifying the option. Every id must appear
    /// in the retrieval result for the same request.
    pub source_doc_ids: Vec<String>,
    /// Validation notes attached by the simulator (stripped citations,
    /// clamped values). Empty for clean options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Marks the "route to a human" sentinel.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub escalation: bool,
}

impl SimulatedOption {
    /// Builds the escalation sentinel: zero cost, zero time, and a
    /// diagnostic explaining why a human needs to look at the request.
    #[must_use]
    pub fn escalation(option_id: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            option_id: option_id.into(),
            action: ESCALATION_ACTION.to_string(),
            steps: vec![
                "Route the request to the property management team".to_string(),
                "Notify the resident that a staff member will follow up".to_string(),
            ],
            estimated_cost: 0.0,
            estimated_time: 0.0,
            resident_satisfaction_impact: 0.5,
            reasoning: diagnostic.into(),
            source_doc_ids: Vec::new(),
            flags: Vec::new(),
            escalation: true,
        }
    }
}

/// Terminal status of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    /// Options were generated and validated.
    Ok,
    /// Generation failed after the allowed retry; the option list holds a
    /// single escalation sentinel.
    Error,
}

/// The simulator's full output for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    /// 3-4 candidate options, in the simulator's preference order.
    pub options: Vec<SimulatedOption>,
    /// The simulator's own first-pass preference. The decider may override.
    pub recommended_option_id: String,
    /// Whether generation succeeded.
    pub status: SimulationStatus,
    /// Diagnostic carried when `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl Simulation {
    /// Returns `true` if the simulation holds nothing but escalation
    /// sentinels (or nothing at all).
    #[must_use]
    pub fn escalation_only(&self) -> bool {
        self.options.iter().all(|o| o.escalation)
    }
}
