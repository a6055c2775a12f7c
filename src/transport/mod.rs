//! Transport layer.
//!
//! A transport is split into two explicit interfaces so adapters and the
//! controller never depend on a concrete connection type:
//!
//! - [`Connector`] opens a new [`Link`]; one call is one connection attempt.
//! - [`Link`] is one established connection: receive frames, send text,
//!   close.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  connect()   ┌───────────┐  Frame   ┌─────────┐  payload  ┌──────────┐
//! │  Controller  │─────────────►│ Connector │─► Link ─►│ Adapter │──────────►│ Registry │
//! │ (driver task)│◄─────────────│ (SSE/WS)  │          └─────────┘           └──────────┘
//! └──────────────┘  Box<Link>   └───────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `sse` | One-way push stream over Server-Sent Events |
//! | `websocket` | Bidirectional session socket over WebSocket |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Server-Sent Events transport.
pub mod sse;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use sse::SseConnector;
pub use websocket::WsConnector;

// ============================================================================
// Frame
// ============================================================================

/// One inbound message, before adapter interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Named event with raw data (push stream).
    Event {
        /// Event name (`message` when the server sent none).
        event: String,
        /// Raw data field.
        data: String,
    },

    /// Whole text message (socket).
    Text(String),
}

// ============================================================================
// Connector / Link
// ============================================================================

/// Opens connections to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs one connection attempt.
    ///
    /// Resolves once the transport is open and ready to deliver frames.
    async fn connect(&self) -> Result<Box<dyn Link>>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;
}

/// One established connection.
///
/// `recv` must be cancel safe: the controller races it against commands.
#[async_trait]
pub trait Link: Send {
    /// Waits for the next frame.
    ///
    /// `None` means the remote closed the connection cleanly;
    /// `Some(Err(_))` is a transport failure. Both end the link.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    /// Sends one text message.
    ///
    /// # Errors
    ///
    /// Fails if the link is receive-only or the write fails.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Closes the link. Idempotent.
    async fn close(&mut self);
}
