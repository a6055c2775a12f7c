//! Push-stream adapter.
//!
//! Handles the named events of the one-way stream:
//!
//! | Event | Effect |
//! |-------|--------|
//! | `connected` | Signals [`Signal::Connected`], dispatched to subscribers |
//! | `heartbeat` | Records liveness only |
//! | `error` | Logged, dispatched as `{"message": ...}` |
//! | anything else | Parsed as a [`MessageEnvelope`], payload dispatched |
//!
//! Events named `message` (no explicit name on the wire) are dispatched
//! under the envelope's `type`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::identifiers::LinkId;
use crate::lifecycle::Liveness;
use crate::protocol::{ErrorNotice, MessageEnvelope, names};
use crate::registry::EventRegistry;
use crate::transport::Frame;

use super::{Adapter, Signal};

// ============================================================================
// PushStreamAdapter
// ============================================================================

/// Adapter for the one-way push stream.
#[derive(Debug, Default)]
pub struct PushStreamAdapter {
    registry: Arc<EventRegistry>,
    last_heartbeat: Mutex<Option<Instant>>,
}

impl PushStreamAdapter {
    /// Creates an adapter with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter dispatching into an existing registry.
    #[must_use]
    pub fn with_registry(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            last_heartbeat: Mutex::new(None),
        }
    }

    /// Instant of the most recent heartbeat, if any arrived.
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<Instant> {
        *self.last_heartbeat.lock()
    }

    fn dispatch(&self, event: &str, payload: &Value, live: &Liveness) {
        self.registry
            .dispatch_while(event, payload, || live.is_live());
    }

    fn handle_event(&self, event: &str, data: &str, live: &Liveness) -> Signal {
        match event {
            names::CONNECTED => {
                info!("Push stream acknowledged by server");
                let payload = serde_json::from_str(data).unwrap_or(Value::Null);
                self.dispatch(names::CONNECTED, &payload, live);
                Signal::Connected
            }

            names::HEARTBEAT => {
                trace!("Heartbeat");
                *self.last_heartbeat.lock() = Some(Instant::now());
                Signal::Continue
            }

            names::ERROR => {
                let notice = ErrorNotice::parse_lossy(data);
                warn!(reason = notice.message(), "Server reported error");
                self.dispatch(names::ERROR, &json!({ "message": notice.message() }), live);
                Signal::Continue
            }

            _ => {
                match MessageEnvelope::parse(data) {
                    Ok(envelope) => {
                        let name = if event == "message" && !envelope.kind.is_empty() {
                            envelope.kind.clone()
                        } else {
                            event.to_string()
                        };
                        debug!(event = %name, "Push message received");
                        self.dispatch(&name, &envelope.into_payload(), live);
                    }
                    Err(e) => {
                        warn!(event, error = %e, "Dropping malformed push message");
                    }
                }
                Signal::Continue
            }
        }
    }
}

impl Adapter for PushStreamAdapter {
    fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    fn on_open(&self, link: LinkId) {
        debug!(%link, "Push stream open");
    }

    fn on_frame(&self, frame: Frame, live: &Liveness) -> Signal {
        match frame {
            Frame::Event { event, data } => self.handle_event(&event, &data, live),
            Frame::Text(text) => self.handle_event("message", &text, live),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
