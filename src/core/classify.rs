//! Classification axes and the risk assessment input.

use serde::{Deserialize, Serialize};

/// Request category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Physical-property issues: HVAC, plumbing, electrical, appliances.
    Maintenance,
    /// Rent, fees, autopay, statements.
    Billing,
    /// Locks, access, suspicious activity.
    Security,
    /// Packages and courier access.
    Deliveries,
    /// Gym, pool, lounge, guest policy.
    Amenities,
}

impl Category {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maintenance => "Maintenance",
            Self::Billing => "Billing",
            Self::Security => "Security",
            Self::Deliveries => "Deliveries",
            Self::Amenities => "Amenities",
        }
    }

    /// Parses a category string (case-insensitive). Returns `None` for
    /// unrecognized values so callers can apply their own default.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "maintenance" => Some(Self::Maintenance),
            "billing" => Some(Self::Billing),
            "security" => Some(Self::Security),
            "deliveries" => Some(Self::Deliveries),
            "amenities" => Some(Self::Amenities),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    /// Requires same-day action.
    High,
    /// Should be handled within a day.
    Medium,
    /// Routine; days of slack are acceptable.
    Low,
}

impl Urgency {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Parses an urgency string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the resident wants from the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Generate and choose a resolution.
    SolveProblem,
    /// Answer a question from the knowledge base.
    AnswerQuestion,
    /// Explicit request for a human operator.
    HumanEscalation,
}

impl Intent {
    /// Returns the wire string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SolveProblem => "solve_problem",
            Self::AnswerQuestion => "answer_question",
            Self::HumanEscalation => "human_escalation",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Request category.
    pub category: Category,
    /// Request urgency.
    pub urgency: Urgency,
    /// Request intent.
    pub intent: Intent,
    /// Classifier confidence in [0,1].
    pub confidence: f64,
}

/// Risk level produced by the external risk predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// High operational risk.
    High,
    /// Medium operational risk.
    Medium,
    /// Low operational risk.
    Low,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        f.write_str(s)
    }
}

/// Risk assessment consumed from the external predictor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Risk score in [0,1].
    pub risk_score: f64,
    /// Discretized risk level.
    pub risk_level: RiskLevel,
}

impl RiskAssessment {
    /// Creates an assessment, clamping the score into [0,1].
    #[must_use]
    pub fn new(risk_score: f64, risk_level: RiskLevel) -> Self {
        Self {
            risk_score: risk_score.clamp(0.0, 1.0),
            risk_level,
        }
    }
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
        }
    }
}
