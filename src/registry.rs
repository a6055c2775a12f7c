//! Event subscription registry.
//!
//! Maps an event name to an ordered set of handlers and fans payloads out
//! to them. One registry is owned by each adapter; consumers may register
//! and remove handlers at any time, including from inside a handler that
//! is currently being dispatched.
//!
//! # Dispatch Guarantees
//!
//! - Handlers run in registration order, synchronously, on the caller.
//! - Each invocation is isolated: a panicking handler is logged with the
//!   event name and the remaining handlers still run.
//! - Dispatch iterates a snapshot taken when it starts, so `on`/`off`
//!   calls made by a handler take effect from the next dispatch.
//!
//! # Example
//!
//! ```ignore
//! let registry = EventRegistry::new();
//! let handler = handler(|payload| println!("{payload}"));
//! registry.on("terminal_output", handler.clone());
//! registry.dispatch("terminal_output", &serde_json::json!({"data": "ls\n"}));
//! registry.off("terminal_output", &handler);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{error, trace};

// ============================================================================
// Types
// ============================================================================

/// Event handler callback.
///
/// Handlers are compared by pointer identity, so keep a clone of the
/// `Arc` to remove it later with [`EventRegistry::off`].
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wraps a closure as an [`EventHandler`].
#[inline]
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// EventRegistry
// ============================================================================

/// Per-instance map from event name to registered handlers.
#[derive(Default)]
pub struct EventRegistry {
    handlers: Mutex<FxHashMap<String, Vec<EventHandler>>>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock();
        f.debug_struct("EventRegistry")
            .field("events", &handlers.len())
            .finish_non_exhaustive()
    }
}

impl EventRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`.
    ///
    /// Registering the same handler twice for one event is a no-op.
    pub fn on(&self, event: impl Into<String>, handler: EventHandler) {
        let event = event.into();
        let mut handlers = self.handlers.lock();
        let set = handlers.entry(event).or_default();

        if !set.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            set.push(handler);
        }
    }

    /// Removes exactly `handler` from `event`.
    ///
    /// Unknown events and unregistered handlers are ignored.
    pub fn off(&self, event: &str, handler: &EventHandler) {
        let mut handlers = self.handlers.lock();
        let Some(set) = handlers.get_mut(event) else {
            return;
        };

        set.retain(|h| !Arc::ptr_eq(h, handler));
        if set.is_empty() {
            handlers.remove(event);
        }
    }

    /// Removes every handler for every event.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.lock().get(event).map_or(0, Vec::len)
    }

    /// Invokes every handler registered for `event` with `payload`.
    ///
    /// Returns the number of handlers invoked. Never panics because of a
    /// handler.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        self.dispatch_while(event, payload, || true)
    }

    /// Like [`dispatch`](Self::dispatch), but checks `live` before each
    /// handler and stops as soon as it returns `false`.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch_while<F>(&self, event: &str, payload: &Value, live: F) -> usize
    where
        F: Fn() -> bool,
    {
        let snapshot: Vec<EventHandler> = match self.handlers.lock().get(event) {
            Some(set) => set.clone(),
            None => return 0,
        };

        trace!(event, handlers = snapshot.len(), "Dispatching event");

        let mut invoked = 0;
        for handler in &snapshot {
            if !live() {
                trace!(event, "Owner gone, dispatch stopped");
                break;
            }

            invoked += 1;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                error!(
                    event,
                    reason = %panic_message(panic.as_ref()),
                    "Event handler failed"
                );
            }
        }

        invoked
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Tests
// ============================================================================
