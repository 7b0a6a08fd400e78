//! Two-stage message classifier.
//!
//! A deterministic rule layer handles high-specificity patterns (distinct
//! category terms plus an explicit danger or urgency cue) and returns
//! immediately with high confidence. Everything else falls back to a
//! single structured-output LLM call, re-requested once on a strict-parse
//! failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::CoreConfig;
use crate::core::{Category, Classification, Intent, Urgency};
use crate::error::AgentError;

use super::prompt::build_classifier_prompt;
use super::provider::LlmProvider;
use super::traits::{Agent, strip_code_fence};

/// Ceiling for LLM-only confidence; values above are reserved for rule hits.
const LLM_CONFIDENCE_CAP: f64 = 0.95;

/// Confidence ceiling when urgency had to be defaulted.
const DEFAULTED_URGENCY_CAP: f64 = 0.6;

/// One keyword pattern: a category-defining term set plus an urgency cue
/// set. Both must hit for the rule to fire.
struct KeywordRule {
    category: Category,
    urgency: Urgency,
    terms: &'static [&'static str],
    cues: &'static [&'static str],
    confidence: f64,
}

/// Rule table, checked in order; first hit wins.
static RULES: &[KeywordRule] = &[
    KeywordRule {
        category: Category::Maintenance,
        urgency: Urgency::High,
        terms: &[
            "ac", "a c", "air conditioning", "air conditioner", "hvac", "heat", "heating",
            "furnace", "leak", "leaking", "pipe", "flood", "no power", "power is out",
            "water heater", "no hot water", "sewage", "gas",
        ],
        cues: &[
            "emergency", "urgent", "immediately", "asap", "right now", "degrees", "f outside",
            "burst", "flooding", "everywhere", "dangerous", "unsafe", "sparking", "smoke",
            "broken",
        ],
        confidence: 0.9,
    },
    KeywordRule {
        category: Category::Security,
        urgency: Urgency::High,
        terms: &[
            "lock", "locked out", "break in", "broken into", "intruder", "stolen", "front door",
            "key fob", "garage door",
        ],
        cues: &[
            "emergency", "urgent", "right now", "tonight", "stolen", "can t get in",
            "cannot get in", "won t lock", "suspicious",
        ],
        confidence: 0.88,
    },
    KeywordRule {
        category: Category::Deliveries,
        urgency: Urgency::Medium,
        terms: &["package", "packages", "parcel", "delivery", "courier"],
        cues: &[
            "missing", "lost", "stolen", "never arrived", "didn t arrive", "not delivered",
            "wrong unit",
        ],
        confidence: 0.82,
    },
    KeywordRule {
        category: Category::Billing,
        urgency: Urgency::Low,
        terms: &["autopay", "auto pay", "late fee", "statement", "invoice", "rent"],
        cues: &["how do i", "how to", "set up", "sign up", "enroll", "where can i"],
        confidence: 0.8,
    },
];

/// Physical-property terms used for the ambiguous-category default.
static PHYSICAL_TERMS: &[&str] = &[
    "ac", "hvac", "heat", "water", "leak", "pipe", "door", "window", "appliance", "plumbing",
    "electrical", "light", "elevator", "wall", "ceiling", "floor", "toilet", "sink",
    "refrigerator", "fridge", "oven", "washer", "dryer", "outlet",
];

/// Terms that mark a concrete complaint (vs. a pure question).
static COMPLAINT_TERMS: &[&str] = &[
    "broken", "broke", "not working", "doesn t work", "won t", "leak", "leaking", "stopped",
    "stuck", "missing", "lost", "stolen", "no hot water", "no power", "out of order", "damaged",
    "flooding", "emergency",
];

/// Explicit requests for a person.
static ESCALATION_TERMS: &[&str] = &[
    "speak to a human", "talk to a human", "speak to a manager", "talk to a manager",
    "real person", "human agent", "speak with someone", "talk to someone", "call me",
];

/// Question openers for intent detection.
static QUESTION_OPENERS: &[&str] = &[
    "what", "when", "where", "who", "how", "why", "is there", "are there", "can i", "can you",
    "could you", "do you", "does", "am i allowed",
];

/// Strict shape of the LLM classification response. Unknown enum strings
/// are rejected by serde and trigger the single re-request.
#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    category: Option<Category>,
    #[serde(default)]
    urgency: Option<Urgency>,
    #[serde(default)]
    intent: Option<Intent>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Two-stage classifier over a rule table and an LLM provider.
pub struct Classifier {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl Classifier {
    /// Creates a classifier from configuration and a system prompt.
    #[must_use]
    pub fn new(config: &CoreConfig, system_prompt: String) -> Self {
        Self {
            model: config.llm_model_id.clone(),
            max_tokens: config.classifier_max_tokens,
            timeout: config.llm_timeout,
            system_prompt,
        }
    }

    /// Classifies a message: rule layer first, LLM fallback second.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Classification`] when the LLM response fails
    /// strict parsing twice, and provider errors otherwise.
    pub async fn classify(
        &self,
        provider: &dyn LlmProvider,
        message_text: &str,
    ) -> Result<Classification, AgentError> {
        if let Some(classification) = classify_by_rules(message_text) {
            debug!(
                category = %classification.category,
                urgency = %classification.urgency,
                "rule-layer classification hit"
            );
            return Ok(classification);
        }
        self.classify_with_llm(provider, message_text).await
    }

    async fn classify_with_llm(
        &self,
        provider: &dyn LlmProvider,
        message_text: &str,
    ) -> Result<Classification, AgentError> {
        let prompt = build_classifier_prompt(message_text);
        let response = self.execute(provider, &prompt).await?;

        let first_error = match parse_classification(&response.content) {
            Ok(raw) => return Ok(normalize(raw, message_text)),
            Err(e) => e,
        };

        // One re-request with the parse error described.
        let retry_prompt = format!(
            "{prompt}\n\nYour previous response could not be parsed: {first_error}. \
             Return ONLY the JSON object with exactly the documented fields and values."
        );
        let retry = self.execute(provider, &retry_prompt).await?;
        match parse_classification(&retry.content) {
            Ok(raw) => Ok(normalize(raw, message_text)),
            Err(e) => Err(AgentError::Classification {
                message: format!("unparseable after retry: {e}"),
            }),
        }
    }
}

#[async_trait]
impl Agent for Classifier {
    fn name(&self) -> &'static str {
        "classifier"
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

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Runs the deterministic rule layer. Returns `None` when no rule fires.
#[must_use]
pub fn classify_by_rules(message_text: &str) -> Option<Classification> {
    let normalized = normalize_text(message_text);
    let intent = detect_intent(message_text);

    for rule in RULES {
        let term_hit = rule.terms.iter().any(|t| contains_term(&normalized, t));
        let cue_hit = rule.cues.iter().any(|c| contains_term(&normalized, c));
        if term_hit && cue_hit {
            return Some(Classification {
                category: rule.category,
                urgency: rule.urgency,
                intent,
                confidence: rule.confidence,
            });
        }
    }
    None
}

/// Deterministic intent detection.
///
/// Explicit requests for a person win; otherwise an interrogative message
/// without a concrete complaint is a question; everything else is a
/// problem to solve.
#[must_use]
pub fn detect_intent(message_text: &str) -> Intent {
    let normalized = normalize_text(message_text);

    if ESCALATION_TERMS.iter().any(|t| contains_term(&normalized, t)) {
        return Intent::HumanEscalation;
    }

    let interrogative = message_text.trim_end().ends_with('?')
        || QUESTION_OPENERS
            .iter()
            .any(|q| normalized.trim_start().starts_with(&format!("{q} ")));
    let has_complaint = COMPLAINT_TERMS.iter().any(|t| contains_term(&normalized, t));

    if interrogative && !has_complaint {
        Intent::AnswerQuestion
    } else {
        Intent::SolveProblem
    }
}

fn parse_classification(content: &str) -> Result<RawClassification, AgentError> {
    let json_str = strip_code_fence(content);
    serde_json::from_str::<RawClassification>(json_str).map_err(|e| AgentError::ResponseParse {
        message: format!("invalid classification JSON: {e}"),
        content: content.to_string(),
    })
}

/// Applies the documented defaults and confidence caps to a parsed
/// response.
fn normalize(raw: RawClassification, message_text: &str) -> Classification {
    let normalized = normalize_text(message_text);
    let mut confidence = raw
        .confidence
        .unwrap_or(0.5)
        .clamp(0.0, LLM_CONFIDENCE_CAP);

    let category = raw.category.unwrap_or_else(|| {
        // Ambiguous category: physical-property term leans Maintenance,
        // otherwise Amenities.
        if PHYSICAL_TERMS.iter().any(|t| contains_term(&normalized, t)) {
            Category::Maintenance
        } else {
            Category::Amenities
        }
    });

    let urgency = match raw.urgency {
        Some(urgency) => urgency,
        None => {
            confidence = confidence.min(DEFAULTED_URGENCY_CAP);
            Urgency::Medium
        }
    };

    let intent = raw.intent.unwrap_or_else(|| detect_intent(message_text));

    Classification {
        category,
        urgency,
        intent,
        confidence,
    }
}

/// Lowercases and strips punctuation so term matching is word-based.
fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Whole-word containment against a normalized haystack.
fn contains_term(normalized: &str, term: &str) -> bool {
    let needle = format!(" {} ", normalize_text(term).trim());
    normalized.contains(&needle)
}
