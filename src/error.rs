//! Error types for live-sync.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use live_sync::{Result, SyncConfig};
//!
//! fn example() -> Result<()> {
//!     let config = SyncConfig::new("http://localhost:8080/events");
//!     config.validate()?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Handling |
//! |----------|----------|----------|
//! | Configuration | [`Error::Config`] | Fatal at construction |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotConnected`] | Retried with backoff |
//! | Protocol | [`Error::Protocol`] | Logged and dropped per message |
//! | REST | [`Error::Api`], [`Error::RequestTimeout`] | Soft error with safe default |
//! | Lifecycle | [`Error::Cancelled`], [`Error::Shutdown`] | Never reported as failure |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] | Mapped per category |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when [`crate::SyncConfig`] is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Transport closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound operation attempted without a live connection.
    #[error("Not connected: cannot {operation}")]
    NotConnected {
        /// The operation that was dropped.
        operation: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed frame or payload.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // REST Errors
    // ========================================================================
    /// REST call returned `success = false` or failed in transit.
    #[error("{message}")]
    Api {
        /// Error text surfaced to the UI.
        message: String,
    },

    /// REST call exceeded the per-request timeout.
    #[error("Request to {path} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Request path.
        path: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation aborted because its owner was torn down.
    ///
    /// Never a real failure: callers must not surface it as an error state.
    #[error("Operation cancelled")]
    Cancelled,

    /// The controller's driver task has already stopped.
    #[error("Controller shut down")]
    Shutdown,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not-connected error for the named operation.
    #[inline]
    pub fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a REST error.
    #[inline]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(path: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            path: path.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error is a cancellation rather than a failure.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Shutdown)
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors drive the backoff scheduler instead of
    /// surfacing to the caller.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::RequestTimeout { .. }
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
