//! Typed tool capabilities for the simulator.
//!
//! Two idempotent tools back one generation: `query_past_solutions` and
//! `check_recurring_issues`. Both read the external request store, both
//! run under the configured tool timeout, and both degrade to an empty
//! result on failure: a dead request store never fails a simulation, it
//! only removes the history signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::core::Category;
use crate::error::AgentError;
use crate::history::{PastRequest, RequestStore};

/// Recurring-issue signal for one (resident, category) pair.
#[derive(Debug, Clone, Serialize)]
pub struct RecurrenceSignal {
    /// Window the counts cover, in days.
    pub window_days: i64,
    /// Requests of any category within the window.
    pub count_in_window: usize,
    /// Requests of the same category within the window.
    pub same_category_count: usize,
    /// Most recent same-category request, if any.
    pub last_occurrence: Option<DateTime<Utc>>,
}

impl RecurrenceSignal {
    /// An empty signal for the given window.
    #[must_use]
    pub const fn empty(window_days: i64) -> Self {
        Self {
            window_days,
            count_in_window: 0,
            same_category_count: 0,
            last_occurrence: None,
        }
    }

    /// A resident is on a recurring issue after two or more same-category
    /// requests inside the window.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        self.same_category_count >= 2
    }
}

/// History and recurrence context gathered for one simulation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Prior resolved requests for the resident.
    pub history: Vec<PastRequest>,
    /// Recurring-issue signal.
    pub recurrence: RecurrenceSignal,
    /// Degradation notes (timeouts, unreachable store). Carried into the
    /// option reasoning so decisions stay auditable.
    pub notes: Vec<String>,
}

/// Tool layer bound to a request store and a per-call timeout.
pub struct HistoryTools {
    store: Arc<dyn RequestStore>,
    timeout: Duration,
    window_days: i64,
}

impl HistoryTools {
    /// Creates the tool layer.
    #[must_use]
    pub fn new(store: Arc<dyn RequestStore>, timeout: Duration, window_days: i64) -> Self {
        Self {
            store,
            timeout,
            window_days,
        }
    }

    /// Returns the resident's prior resolved requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Timeout`] on deadline breach or the store's
    /// [`AgentError::ToolUnavailable`].
    pub async fn query_past_solutions(
        &self,
        resident_id: &str,
    ) -> Result<Vec<PastRequest>, AgentError> {
        let mut history =
            tokio::time::timeout(self.timeout, self.store.list_by_resident(resident_id))
                .await
                .map_err(|_| AgentError::Timeout {
                    stage: "query_past_solutions",
                    secs: self.timeout.as_secs(),
                })??;
        history.retain(|r| r.status.eq_ignore_ascii_case("resolved"));
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    /// Computes the recurring-issue signal for the resident and category.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Timeout`] on deadline breach or the store's
    /// [`AgentError::ToolUnavailable`].
    pub async fn check_recurring_issues(
        &self,
        resident_id: &str,
        category: Category,
        now: DateTime<Utc>,
    ) -> Result<RecurrenceSignal, AgentError> {
        let history =
            tokio::time::timeout(self.timeout, self.store.list_by_resident(resident_id))
                .await
                .map_err(|_| AgentError::Timeout {
                    stage: "check_recurring_issues",
                    secs: self.timeout.as_secs(),
                })??;
        Ok(recurrence_from_history(
            &history,
            category,
            self.window_days,
            now,
        ))
    }

    /// Runs both tools in parallel and degrades failures to empty results.
    ///
    /// Options are only generated after both calls return or time out, and
    /// every degradation is recorded in [`ToolContext::notes`].
    pub async fn gather(&self, resident_id: &str, category: Category) -> ToolContext {
        let now = Utc::now();
        let (history, recurrence) = tokio::join!(
            self.query_past_solutions(resident_id),
            self.check_recurring_issues(resident_id, category, now),
        );

        let mut notes = Vec::new();
        let history = match history {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "past-solutions tool degraded to empty");
                notes.push(format!("history unavailable: {e}"));
                Vec::new()
            }
        };
        let recurrence = match recurrence {
            Ok(signal) => signal,
            Err(e) => {
                warn!(error = %e, "recurring-issues tool degraded to empty");
                notes.push(format!("recurrence signal unavailable: {e}"));
                RecurrenceSignal::empty(self.window_days)
            }
        };

        ToolContext {
            history,
            recurrence,
            notes,
        }
    }
}

impl std::fmt::Debug for HistoryTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryTools")
            .field("timeout", &self.timeout)
            .field("window_days", &self.window_days)
            .finish_non_exhaustive()
    }
}

/// Pure recurrence computation over an already-fetched history.
fn recurrence_from_history(
    history: &[PastRequest],
    category: Category,
    window_days: i64,
    now: DateTime<Utc>,
) -> RecurrenceSignal {
    let cutoff = now - chrono::Duration::days(window_days);
    let in_window: Vec<&PastRequest> = history.iter().filter(|r| r.created_at >= cutoff).collect();
    let same_category: Vec<&&PastRequest> = in_window
        .iter()
        .filter(|r| r.category.eq_ignore_ascii_case(category.as_str()))
        .collect();

    RecurrenceSignal {
        window_days,
        count_in_window: in_window.len(),
        same_category_count: same_category.len(),
        last_occurrence: same_category.iter().map(|r| r.created_at).max(),
    }
}
