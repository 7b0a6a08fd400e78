//! Shared contracts for the decision core.
//!
//! Request/response shapes exchanged between the classifier, retriever,
//! simulator, decider, and orchestrator. These are plain data: every
//! invariant that needs enforcement (ranges, id uniqueness, citation
//! subsets) is checked by the component that produces the value.

pub mod classify;
pub mod decision;
pub mod message;
pub mod option;

pub use classify::{Category, Classification, Intent, RiskAssessment, RiskLevel, Urgency};
pub use decision::{Decision, PolicyWeights};
pub use message::ResidentMessage;
pub use option::{SimulatedOption, Simulation, SimulationStatus};
