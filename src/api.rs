//! REST collaborator used for first paint and fallback polling.
//!
//! The live sync layer only needs one verb: a `GET` returning the full
//! current state. Responses use the envelope shared with the rest of the
//! application's REST API:
//!
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "Agent not found" }
//! ```
//!
//! Failures are surfaced as error strings ([`crate::Error::Api`]); a
//! cancelled request is [`crate::Error::Cancelled`] and is never treated as
//! a failure.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// ApiResponse
// ============================================================================

/// REST response envelope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    /// Whether the call succeeded.
    pub success: bool,

    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response.
    #[inline]
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates a failed response.
    #[inline]
    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Converts the envelope into the payload or an [`Error::Api`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] when `success` is false or `data` is absent.
    pub fn into_result(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(Error::api("Response contained no data")),
            (false, _) => Err(Error::api(
                self.error.unwrap_or_else(|| "Request failed".to_string()),
            )),
        }
    }
}

// ============================================================================
// ApiClient
// ============================================================================

/// Minimal REST client interface.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Performs `GET path`.
    ///
    /// Transport failures are reported as `ApiResponse::err`, so only the
    /// envelope needs inspecting.
    async fn get(&self, path: &str) -> ApiResponse<Value>;
}

/// Runs `client.get(path)` bound to `cancel` and `timeout`.
///
/// # Errors
///
/// - [`Error::Cancelled`] if `cancel` fires first
/// - [`Error::RequestTimeout`] if the request outlives `timeout`
/// - [`Error::Api`] if the response reports failure
pub async fn fetch(
    client: &dyn ApiClient,
    path: &str,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<Value> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            debug!(path, "Request cancelled");
            Err(Error::Cancelled)
        }

        result = tokio::time::timeout(timeout, client.get(path)) => match result {
            Ok(response) => response.into_result(),
            Err(_) => Err(Error::request_timeout(path, timeout.as_millis() as u64)),
        },
    }
}

// ============================================================================
// HttpApiClient
// ============================================================================

/// [`ApiClient`] over HTTP.
#[derive(Clone)]
pub struct HttpApiClient {
    base: Url,
    http: reqwest::Client,
}

impl fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpApiClient {
    /// Creates a client rooted at `base` (e.g. `http://localhost:3001`).
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `base` does not parse
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base, http })
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn try_get(&self, path: &str) -> Result<ApiResponse<Value>> {
        let url = self.base.join(path)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();

        match response.json::<ApiResponse<Value>>().await {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => Ok(ApiResponse::err(format!("HTTP {status}"))),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn get(&self, path: &str) -> ApiResponse<Value> {
        match self.try_get(path).await {
            Ok(response) => response,
            Err(e) => {
                warn!(path, error = %e, "GET failed");
                ApiResponse::err(e.to_string())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
