//! Push-stream message envelope.
//!
//! Every application event on the push stream carries a JSON envelope:
//!
//! ```json
//! {
//!   "type": "status_update",
//!   "data": { "activeAgents": 2, "agents": [ ... ] },
//!   "timestamp": "2026-10-18T12:00:00Z"
//! }
//! ```
//!
//! Adapters unwrap the envelope so subscribers only ever see `data`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// MessageEnvelope
// ============================================================================

/// Transport-agnostic wrapper around one pushed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Application message type.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Opaque payload handed to subscribers.
    #[serde(default)]
    pub data: Value,

    /// Server timestamp, either an ISO-8601 string or epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

impl MessageEnvelope {
    /// Parses an envelope from raw event data.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if `raw` is not a JSON object of
    /// the expected shape.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Consumes the envelope and returns the payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.data
    }
}

// ============================================================================
// ErrorNotice
// ============================================================================

/// Server-reported error, `{"data": {"message": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ErrorNotice {
    /// Error detail.
    #[serde(default)]
    pub data: ErrorDetail,
}

/// Body of an [`ErrorNotice`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorNotice {
    /// Parses an error notice, tolerating an empty or malformed body.
    #[must_use]
    pub fn parse_lossy(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Returns the message or a generic placeholder.
    #[must_use]
    pub fn message(&self) -> &str {
        self.data.message.as_deref().unwrap_or("unspecified server error")
    }
}

// ============================================================================
// Tests
// ============================================================================
