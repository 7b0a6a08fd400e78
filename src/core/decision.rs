//! Decisions and policy weighting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Weights for the five policy sub-scores. All components must be >= 0;
/// they are normalised to sum to 1 at use time via [`PolicyWeights::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    /// Weight of the cost sub-score.
    pub cost: f64,
    /// Weight of the time sub-score.
    pub time: f64,
    /// Weight of the satisfaction sub-score.
    pub satisfaction: f64,
    /// Weight of urgency/turnaround alignment.
    pub urgency_alignment: f64,
    /// Weight of citation-backed policy compliance.
    pub policy_compliance: f64,
}

impl PolicyWeights {
    /// Returns a copy with non-negative components scaled to sum to 1.
    /// A degenerate all-zero table normalises to equal weights.
    #[must_use]
    pub fn normalized(self) -> Self {
        let cost = self.cost.max(0.0);
        let time = self.time.max(0.0);
        let satisfaction = self.satisfaction.max(0.0);
        let urgency_alignment = self.urgency_alignment.max(0.0);
        let policy_compliance = self.policy_compliance.max(0.0);
        let sum = cost + time + satisfaction + urgency_alignment + policy_compliance;
        if sum <= f64::EPSILON {
            return Self {
                cost: 0.2,
                time: 0.2,
                satisfaction: 0.2,
                urgency_alignment: 0.2,
                policy_compliance: 0.2,
            };
        }
        Self {
            cost: cost / sum,
            time: time / sum,
            satisfaction: satisfaction / sum,
            urgency_alignment: urgency_alignment / sum,
            policy_compliance: policy_compliance / sum,
        }
    }
}

impl Default for PolicyWeights {
    fn default() -> Self {
        Self {
            cost: 0.2,
            time: 0.25,
            satisfaction: 0.25,
            urgency_alignment: 0.15,
            policy_compliance: 0.15,
        }
    }
}

/// The decider's auditable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Id of the selected option. Always present in the simulation.
    pub chosen_option_id: String,
    /// Why this option won, naming the decisive sub-scores.
    pub reasoning: String,
    /// Remaining option ids, ordered by descending composite score.
    pub alternatives_considered: Vec<String>,
    /// Composite policy score per option id, each in [0,1].
    pub policy_scores: BTreeMap<String, f64>,
}
