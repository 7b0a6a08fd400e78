//! Client for the external request store.
//!
//! The core never persists request data itself; resident history is read
//! on demand through this narrow interface. Transport failures and error
//! statuses are mapped to [`AgentError::ToolUnavailable`], which the tool
//! layer recovers as "no history available".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Header carrying the shared admin key for gated endpoints.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// A prior request as exposed by the request store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastRequest {
    /// Store-assigned id.
    pub request_id: String,
    /// Category recorded at submission time.
    pub category: String,
    /// Lifecycle status (e.g. `resolved`, `open`).
    pub status: String,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// Original message text.
    pub message_text: String,
}

/// Read access to the external request store.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Lists prior requests for one resident.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolUnavailable`] when the store is
    /// unreachable or responds with an error status.
    async fn list_by_resident(&self, resident_id: &str) -> Result<Vec<PastRequest>, AgentError>;

    /// Lists all requests. Admin-gated on the server side.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolUnavailable`] on transport or status
    /// errors, including missing credentials.
    async fn list_all(&self) -> Result<Vec<PastRequest>, AgentError>;
}

/// HTTP-backed request store client.
pub struct HttpRequestStore {
    client: reqwest::Client,
    base_url: String,
    admin_key: Option<String>,
}

impl HttpRequestStore {
    /// Creates a client for the store at `base_url` (no trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>, admin_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            admin_key,
        }
    }

    async fn fetch(&self, url: &str, admin: bool) -> Result<Vec<PastRequest>, AgentError> {
        let mut request = self.client.get(url);
        if admin {
            let key = self
                .admin_key
                .as_deref()
                .ok_or_else(|| AgentError::ToolUnavailable {
                    message: "admin key not configured".to_string(),
                })?;
            request = request.header(ADMIN_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::ToolUnavailable {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AgentError::ToolUnavailable {
                message: format!("request store returned {}", response.status()),
            });
        }

        response
            .json::<Vec<PastRequest>>()
            .await
            .map_err(|e| AgentError::ToolUnavailable {
                message: format!("invalid request store payload: {e}"),
            })
    }
}

#[async_trait]
impl RequestStore for HttpRequestStore {
    async fn list_by_resident(&self, resident_id: &str) -> Result<Vec<PastRequest>, AgentError> {
        let url = format!(
            "{}/requests?resident_id={resident_id}",
            self.base_url.trim_end_matches('/')
        );
        self.fetch(&url, false).await
    }

    async fn list_all(&self) -> Result<Vec<PastRequest>, AgentError> {
        let url = format!("{}/requests", self.base_url.trim_end_matches('/'));
        self.fetch(&url, true).await
    }
}

impl std::fmt::Debug for HttpRequestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequestStore")
            .field("base_url", &self.base_url)
            .field("admin_key", &self.admin_key.as_deref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

/// Fixed-content store for deployments without a request store and for
/// tests. Empty by default.
#[derive(Debug, Clone, Default)]
pub struct StaticRequestStore {
    requests: Vec<PastRequest>,
}

impl StaticRequestStore {
    /// Creates a store holding the given requests.
    #[must_use]
    pub fn new(requests: Vec<PastRequest>) -> Self {
        Self { requests }
    }
}

#[async_trait]
impl RequestStore for StaticRequestStore {
    async fn list_by_resident(&self, resident_id: &str) -> Result<Vec<PastRequest>, AgentError> {
        let _ = resident_id;
        Ok(self.requests.clone())
    }

    async fn list_all(&self) -> Result<Vec<PastRequest>, AgentError> {
        Ok(self.requests.clone())
    }
}
