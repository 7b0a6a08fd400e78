//! Decider: weighted policy scoring over simulated options.
//!
//! Pure and deterministic: sub-scores, urgency-dependent weights from
//! configuration, argmax with a documented tie-break, and an auditable
//! [`Decision`] naming the decisive sub-scores.

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::CoreConfig;
use crate::core::{Classification, Decision, Simulation, Urgency};
use crate::retrieval::RetrievalResult;

/// Composite scores closer than this are treated as tied.
const SCORE_EPSILON: f64 = 1e-9;

/// The five sub-scores for one option, each in [0,1].
#[derive(Debug, Clone, Copy)]
struct SubScores {
    cost: f64,
    time: f64,
    satisfaction: f64,
    urgency_alignment: f64,
    policy_compliance: f64,
}

#[derive(Debug, Clone)]
struct ScoredOption {
    option_id: String,
    composite: f64,
    sub: SubScores,
    estimated_cost: f64,
    estimated_time: f64,
    action: String,
}

/// Scores every option and chooses one.
///
/// The chosen option is the composite-score argmax; exact ties fall back
/// to (higher policy compliance, lower cost, lower time) and are logged
/// with the competing option ids. An options list holding nothing but
/// escalation sentinels selects the escalation without error.
#[must_use]
pub fn decide(
    config: &CoreConfig,
    classification: &Classification,
    simulation: &Simulation,
    retrieval: &RetrievalResult,
) -> Decision {
    let weights = config
        .policy_weights
        .for_urgency(classification.urgency)
        .normalized();
    let retrieved_ids = retrieval.doc_ids();

    let mut scored: Vec<ScoredOption> = simulation
        .options
        .iter()
        .map(|option| {
            let cited: Vec<&String> = option.source_doc_ids.iter().collect();
            let in_retrieval = cited
                .iter()
                .filter(|doc_id| retrieved_ids.contains(doc_id.as_str()))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let policy_compliance = if cited.is_empty() {
                0.0
            } else {
                in_retrieval as f64 / cited.len().max(1) as f64
            };

            let sub = SubScores {
                cost: cost_score(option.estimated_cost, config.cost_cap(classification.category)),
                time: time_score(option.estimated_time, config.time_cap(classification.urgency)),
                satisfaction: option.resident_satisfaction_impact.clamp(0.0, 1.0),
                urgency_alignment: urgency_alignment(
                    classification.urgency,
                    option.estimated_time,
                    config,
                ),
                policy_compliance,
            };

            let composite = (weights.cost * sub.cost
                + weights.time * sub.time
                + weights.satisfaction * sub.satisfaction
                + weights.urgency_alignment * sub.urgency_alignment
                + weights.policy_compliance * sub.policy_compliance)
                .clamp(0.0, 1.0);

            ScoredOption {
                option_id: option.option_id.clone(),
                composite,
                sub,
                estimated_cost: option.estimated_cost,
                estimated_time: option.estimated_time,
                action: option.action.clone(),
            }
        })
        .collect();

    // Rank: composite desc, ties by compliance desc, cost asc, time asc.
    scored.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.sub
                    .policy_compliance
                    .partial_cmp(&a.sub.policy_compliance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                a.estimated_cost
                    .partial_cmp(&b.estimated_cost)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                a.estimated_time
                    .partial_cmp(&b.estimated_time)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    let policy_scores: BTreeMap<String, f64> = scored
        .iter()
        .map(|s| (s.option_id.clone(), s.composite))
        .collect();

    let Some(winner) = scored.first() else {
        // Empty option lists do not occur in the pipeline (the simulator
        // pads), but direct callers get a bare escalation decision.
        return Decision {
            chosen_option_id: String::new(),
            reasoning: "no options to score; human follow-up required".to_string(),
            alternatives_considered: Vec::new(),
            policy_scores,
        };
    };

    let tied: Vec<&str> = scored
        .iter()
        .filter(|s| (s.composite - winner.composite).abs() < SCORE_EPSILON)
        .map(|s| s.option_id.as_str())
        .collect();
    if tied.len() > 1 {
        warn!(options = ?tied, "policy score tie, resolved by compliance/cost/time");
    }

    let reasoning = if simulation.escalation_only() {
        "Only escalation options were available; routing to a human operator.".to_string()
    } else {
        build_reasoning(winner, &weights, tied.len() > 1)
    };
    let alternatives_considered = scored
        .iter()
        .skip(1)
        .map(|s| s.option_id.clone())
        .collect();

    Decision {
        chosen_option_id: winner.option_id.clone(),
        reasoning,
        alternatives_considered,
        policy_scores,
    }
}

fn cost_score(cost: f64, cap: f64) -> f64 {
    1.0 - (cost / cap.max(f64::EPSILON)).min(1.0)
}

fn time_score(time_h: f64, cap: f64) -> f64 {
    1.0 - (time_h / cap.max(f64::EPSILON)).min(1.0)
}

/// Alignment between an option's turnaround and the request urgency.
///
/// Within the urgency's time cap (or any turnaround for Low urgency) the
/// score is 1; beyond the cap it decays proportionally as `cap / time`.
fn urgency_alignment(urgency: Urgency, time_h: f64, config: &CoreConfig) -> f64 {
    match urgency {
        Urgency::Low => 1.0,
        Urgency::High | Urgency::Medium => {
            let cap = config.time_cap(urgency);
            if time_h <= cap {
                1.0
            } else {
                (cap / time_h.max(f64::EPSILON)).clamp(0.0, 1.0)
            }
        }
    }
}

/// Names the decisive (highest weighted-contribution) sub-scores.
fn build_reasoning(
    winner: &ScoredOption,
    weights: &crate::core::PolicyWeights,
    tie_broken: bool,
) -> String {
    let mut contributions = [
        ("cost", weights.cost * winner.sub.cost),
        ("time", weights.time * winner.sub.time),
        ("satisfaction", weights.satisfaction * winner.sub.satisfaction),
        (
            "urgency_alignment",
            weights.urgency_alignment * winner.sub.urgency_alignment,
        ),
        (
            "policy_compliance",
            weights.policy_compliance * winner.sub.policy_compliance,
        ),
    ];
    contributions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut reasoning = format!(
        "Selected \"{}\" with composite score {:.2}; decisive sub-scores: {} ({:.2}) and {} ({:.2}).",
        winner.action,
        winner.composite,
        contributions[0].0,
        contributions[0].1,
        contributions[1].0,
        contributions[1].1,
    );
    if tie_broken {
        reasoning.push_str(
            " Composite scores tied; resolved by policy compliance, then cost, then time.",
        );
    }
    reasoning
}
