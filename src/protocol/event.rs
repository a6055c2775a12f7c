//! Event names and inbound socket events.
//!
//! Both transports deliver named events. The registry is keyed by these
//! names; [`SocketEvent`] offers a typed view over socket payloads.
//!
//! # Socket Events
//!
//! | Scope | Events |
//! |-------|--------|
//! | Session | `terminal_output`, `initial_terminal_state`, `session_status`, `input_received`, `subscription_confirmed`, `unsubscription_confirmed`, `session_pending`, `session_not_found` |
//! | Process-wide | `connected`, `error`, `system_notification`, `*_status_changed`, `*_activity_updated` |
//!
//! Session-scoped and process-wide events share one dispatch path; they
//! differ only in whether the payload carries a session id.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::SessionId;

// ============================================================================
// Event Names
// ============================================================================

/// Well-known event names.
pub mod names {
    /// Server acknowledged the stream/socket.
    pub const CONNECTED: &str = "connected";
    /// Liveness ping on the push stream.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Server-reported error.
    pub const ERROR: &str = "error";
    /// Default application event on the push stream.
    pub const STATUS_UPDATE: &str = "status_update";

    /// Terminal output chunk.
    pub const TERMINAL_OUTPUT: &str = "terminal_output";
    /// Full terminal buffer sent after subscribing.
    pub const INITIAL_TERMINAL_STATE: &str = "initial_terminal_state";
    /// Session lifecycle status.
    pub const SESSION_STATUS: &str = "session_status";
    /// Server echoed receipt of input.
    pub const INPUT_RECEIVED: &str = "input_received";
    /// Session subscription accepted.
    pub const SUBSCRIPTION_CONFIRMED: &str = "subscription_confirmed";
    /// Session subscription removed.
    pub const UNSUBSCRIPTION_CONFIRMED: &str = "unsubscription_confirmed";
    /// Session exists but is not ready yet.
    pub const SESSION_PENDING: &str = "session_pending";
    /// Session id unknown to the server.
    pub const SESSION_NOT_FOUND: &str = "session_not_found";
    /// Broadcast notice for every client.
    pub const SYSTEM_NOTIFICATION: &str = "system_notification";

    /// Suffix of process-wide status change events.
    pub const STATUS_CHANGED_SUFFIX: &str = "_status_changed";
    /// Suffix of process-wide activity events.
    pub const ACTIVITY_UPDATED_SUFFIX: &str = "_activity_updated";
}

// ============================================================================
// SocketFrame
// ============================================================================

/// Raw inbound socket frame, `{"event": name, "data": payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketFrame {
    /// Event name.
    pub event: String,

    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl SocketFrame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Parses a frame from a text message.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the text is not a frame.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Returns the typed view of this frame.
    #[must_use]
    pub fn to_event(&self) -> SocketEvent {
        SocketEvent::parse(&self.event, &self.data)
    }
}

// ============================================================================
// SocketEvent
// ============================================================================

/// Typed inbound socket event.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Socket acknowledged by the server.
    Connected,

    /// Terminal output chunk.
    TerminalOutput {
        /// Source session.
        session_id: SessionId,
        /// Output text.
        data: String,
    },

    /// Full terminal buffer.
    InitialTerminalState {
        /// Source session.
        session_id: SessionId,
        /// Buffered output.
        data: String,
    },

    /// Session lifecycle status.
    SessionStatus {
        /// Source session.
        session_id: SessionId,
        /// Status label.
        status: String,
    },

    /// Server echoed receipt of input.
    InputReceived {
        /// Target session.
        session_id: SessionId,
    },

    /// Session subscription accepted.
    SubscriptionConfirmed {
        /// Subscribed session.
        session_id: SessionId,
    },

    /// Session subscription removed.
    UnsubscriptionConfirmed {
        /// Unsubscribed session.
        session_id: SessionId,
    },

    /// Session not ready yet.
    SessionPending {
        /// Pending session.
        session_id: SessionId,
    },

    /// Session unknown to the server.
    SessionNotFound {
        /// Requested session.
        session_id: SessionId,
    },

    /// Server-reported error.
    Error {
        /// Error message.
        message: String,
    },

    /// Broadcast notice.
    SystemNotification {
        /// Notification text.
        message: String,
    },

    /// `<entity>_status_changed`.
    StatusChanged {
        /// Entity kind, the prefix before the suffix (e.g. `agent`).
        entity: String,
        /// Full payload.
        payload: Value,
    },

    /// `<entity>_activity_updated`.
    ActivityUpdated {
        /// Entity kind.
        entity: String,
        /// Full payload.
        payload: Value,
    },

    /// Anything else.
    Unknown {
        /// Event name.
        event: String,
        /// Event payload.
        payload: Value,
    },
}

impl SocketEvent {
    /// Parses a named payload into a typed event.
    ///
    /// Session events without a session id fall back to [`SocketEvent::Unknown`].
    #[must_use]
    pub fn parse(event: &str, payload: &Value) -> Self {
        let session = session_id_of(payload);

        match (event, session) {
            (names::CONNECTED, _) => Self::Connected,

            (names::TERMINAL_OUTPUT, Some(session_id)) => Self::TerminalOutput {
                session_id,
                data: get_string(payload, "data"),
            },

            (names::INITIAL_TERMINAL_STATE, Some(session_id)) => Self::InitialTerminalState {
                session_id,
                data: get_string(payload, "data"),
            },

            (names::SESSION_STATUS, Some(session_id)) => Self::SessionStatus {
                session_id,
                status: get_string(payload, "status"),
            },

            (names::INPUT_RECEIVED, Some(session_id)) => Self::InputReceived { session_id },

            (names::SUBSCRIPTION_CONFIRMED, Some(session_id)) => {
                Self::SubscriptionConfirmed { session_id }
            }

            (names::UNSUBSCRIPTION_CONFIRMED, Some(session_id)) => {
                Self::UnsubscriptionConfirmed { session_id }
            }

            (names::SESSION_PENDING, Some(session_id)) => Self::SessionPending { session_id },

            (names::SESSION_NOT_FOUND, Some(session_id)) => Self::SessionNotFound { session_id },

            (names::ERROR, _) => Self::Error {
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| payload.as_str())
                    .unwrap_or("unspecified server error")
                    .to_string(),
            },

            (names::SYSTEM_NOTIFICATION, _) => Self::SystemNotification {
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| payload.as_str())
                    .unwrap_or_default()
                    .to_string(),
            },

            _ => {
                if let Some(entity) = event.strip_suffix(names::STATUS_CHANGED_SUFFIX) {
                    Self::StatusChanged {
                        entity: entity.to_string(),
                        payload: payload.clone(),
                    }
                } else if let Some(entity) = event.strip_suffix(names::ACTIVITY_UPDATED_SUFFIX) {
                    Self::ActivityUpdated {
                        entity: entity.to_string(),
                        payload: payload.clone(),
                    }
                } else {
                    Self::Unknown {
                        event: event.to_string(),
                        payload: payload.clone(),
                    }
                }
            }
        }
    }

    /// Returns the session this event addresses, `None` for process-wide events.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::TerminalOutput { session_id, .. }
            | Self::InitialTerminalState { session_id, .. }
            | Self::SessionStatus { session_id, .. }
            | Self::InputReceived { session_id }
            | Self::SubscriptionConfirmed { session_id }
            | Self::UnsubscriptionConfirmed { session_id }
            | Self::SessionPending { session_id }
            | Self::SessionNotFound { session_id } => Some(session_id),
            _ => None,
        }
    }
}

/// Extracts the session id from a payload.
///
/// Accepts `sessionId`, `session_id` or `id` fields, or a bare string.
#[must_use]
pub fn session_id_of(payload: &Value) -> Option<SessionId> {
    if let Some(id) = payload.as_str() {
        return Some(SessionId::new(id));
    }

    ["sessionId", "session_id", "id"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(SessionId::new)
}

/// Gets a string field, empty when missing.
#[inline]
fn get_string(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
