//! Wire message types.
//!
//! This module defines the frames exchanged with the server over both
//! transports.
//!
//! # Protocol Overview
//!
//! | Message Type | Transport | Direction | Purpose |
//! |--------------|-----------|-----------|---------|
//! | [`MessageEnvelope`] | push-stream | Server → Client | Application data `{type, data, timestamp}` |
//! | [`SocketFrame`] | session socket | Server → Client | Named event `{event, data}` |
//! | [`SocketCommand`] | session socket | Client → Server | Session subscription, input, resize |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outbound socket commands |
//! | `envelope` | Push-stream envelope and error notice |
//! | `event` | Event names and typed inbound socket events |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound socket commands.
pub mod command;

/// Push-stream message envelope.
pub mod envelope;

/// Event names and inbound socket events.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::SocketCommand;
pub use envelope::{ErrorNotice, MessageEnvelope};
pub use event::{SocketEvent, SocketFrame, names};
