//! Outbound socket commands.
//!
//! Commands serialize to the same `{event, data}` frame shape the server
//! uses for inbound events:
//!
//! | Command | Frame |
//! |---------|-------|
//! | [`SocketCommand::SubscribeToSession`] | `{"event":"subscribe_to_session","data":"<id>"}` |
//! | [`SocketCommand::UnsubscribeFromSession`] | `{"event":"unsubscribe_from_session","data":"<id>"}` |
//! | [`SocketCommand::SendInput`] | `{"event":"send_input","data":{"id":"<id>","input":"ls\n"}}` |
//! | [`SocketCommand::TerminalResize`] | `{"event":"terminal_resize","data":{"id":"<id>","cols":80,"rows":24}}` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identifiers::SessionId;

// ============================================================================
// SocketCommand
// ============================================================================

/// Client-to-server socket command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SocketCommand {
    /// Start streaming a session's output to this client.
    SubscribeToSession(SessionId),

    /// Stop streaming a session's output.
    UnsubscribeFromSession(SessionId),

    /// Write user input to a session.
    SendInput {
        /// Target session.
        id: SessionId,
        /// Raw input text.
        input: String,
    },

    /// Resize a session's terminal.
    TerminalResize {
        /// Target session.
        id: SessionId,
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
}

impl SocketCommand {
    /// Returns the wire event name.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SubscribeToSession(_) => "subscribe_to_session",
            Self::UnsubscribeFromSession(_) => "unsubscribe_from_session",
            Self::SendInput { .. } => "send_input",
            Self::TerminalResize { .. } => "terminal_resize",
        }
    }

    /// Returns the session the command addresses.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::SubscribeToSession(id)
            | Self::UnsubscribeFromSession(id)
            | Self::SendInput { id, .. }
            | Self::TerminalResize { id, .. } => id,
        }
    }

    /// Serializes the command to a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
