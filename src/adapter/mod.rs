//! Transport adapters.
//!
//! An adapter interprets the frames of one transport variant and routes
//! payloads into its [`EventRegistry`]. The controller owns connection
//! state; adapters only report what a frame means for it.
//!
//! | Adapter | Transport | Outbound |
//! |---------|-----------|----------|
//! | [`PushStreamAdapter`] | SSE, one URL | none |
//! | [`SessionSocketAdapter`] | WebSocket, addressed sessions | via [`SessionSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::config::BackoffProfile;
use crate::identifiers::LinkId;
use crate::lifecycle::Liveness;
use crate::registry::EventRegistry;
use crate::transport::Frame;

// ============================================================================
// Submodules
// ============================================================================

/// One-way push-stream adapter.
pub mod push;

/// Bidirectional session socket adapter.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use push::PushStreamAdapter;
pub use socket::{SessionSocket, SessionSocketAdapter};

// ============================================================================
// Types
// ============================================================================

/// What a frame means for the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing changes.
    Continue,
    /// Server acknowledged the connection; reset the attempt counter.
    Connected,
}

/// Why a link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport failed or the server went away.
    Lost,
    /// Explicit `disconnect()` or teardown.
    Disconnected,
}

// ============================================================================
// Adapter
// ============================================================================

/// Interprets transport frames for one variant.
pub trait Adapter: Send + Sync {
    /// Registry receiving this adapter's payloads.
    fn registry(&self) -> &Arc<EventRegistry>;

    /// Growth curve used when the configuration does not pick one.
    fn default_backoff(&self) -> BackoffProfile {
        BackoffProfile::Doubling
    }

    /// Called once a new link is established.
    fn on_open(&self, _link: LinkId) {}

    /// Handles one inbound frame.
    ///
    /// Must not panic on malformed input; drop and log instead.
    fn on_frame(&self, frame: Frame, live: &Liveness) -> Signal;

    /// Called when the current link ends.
    fn on_close(&self, _reason: CloseReason) {}
}
