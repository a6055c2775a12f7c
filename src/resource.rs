//! REST-backed resources with a safe default.
//!
//! A [`Resource`] fetches one path and keeps `{data, loading, error}` for
//! the UI. A failed fetch never leaves the UI without data: the value is
//! replaced by [`Snapshot::fallback`] and the error text is kept alongside.
//! A cancelled fetch changes nothing and never sets `error`.
//!
//! Resources can also follow a registry event, so pushed or polled
//! snapshots update them without another request.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ApiClient, fetch};
use crate::error::{Error, Result};
use crate::lifecycle::Liveness;
use crate::registry::{EventHandler, EventRegistry, handler};

// ============================================================================
// Snapshot
// ============================================================================

/// A value fetched over REST that has a renderable default.
pub trait Snapshot: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Value shown after a failed fetch.
    fn fallback(error: &str) -> Self;
}

// ============================================================================
// ResourceState
// ============================================================================

/// Observable resource state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    /// Current value.
    pub data: T,
    /// A fetch is in flight.
    pub loading: bool,
    /// Text of the last failure, cleared by the next success.
    pub error: Option<String>,
}

// ============================================================================
// Resource
// ============================================================================

struct Inner<T> {
    api: Arc<dyn ApiClient>,
    path: String,
    timeout: Duration,
    cancel: CancellationToken,
    live: Arc<Liveness>,
    state: watch::Sender<ResourceState<T>>,
}

/// One REST resource bound to a lifetime.
///
/// Cheap to clone.
pub struct Resource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.inner.path)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<T: Snapshot> Resource<T> {
    /// Creates a resource showing `initial` until the first fetch.
    ///
    /// Requests are cancelled when `cancel` fires; nothing is updated once
    /// `live` reports unmounted.
    #[must_use]
    pub fn new(
        api: Arc<dyn ApiClient>,
        path: impl Into<String>,
        initial: T,
        timeout: Duration,
        cancel: CancellationToken,
        live: Arc<Liveness>,
    ) -> Self {
        let (state, _) = watch::channel(ResourceState {
            data: initial,
            loading: false,
            error: None,
        });

        Self {
            inner: Arc::new(Inner {
                api,
                path: path.into(),
                timeout,
                cancel,
                live,
                state,
            }),
        }
    }

    /// Fetches the resource and publishes the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the owner went away; state is untouched
    /// - any fetch error, after the fallback value and error text have
    ///   been published
    pub async fn refresh(&self) -> Result<T> {
        let inner = &self.inner;
        self.update(|s| s.loading = true);

        let result = fetch(inner.api.as_ref(), &inner.path, &inner.cancel, inner.timeout)
            .await
            .and_then(|value| serde_json::from_value::<T>(value).map_err(Error::from));

        if !self.is_active() {
            debug!(path = %inner.path, "Fetch finished after unmount, discarded");
            return Err(Error::Cancelled);
        }

        match result {
            Ok(data) => {
                self.update(|s| {
                    s.data = data.clone();
                    s.loading = false;
                    s.error = None;
                });
                Ok(data)
            }
            Err(e) if e.is_cancelled() => {
                self.update(|s| s.loading = false);
                Err(e)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(path = %inner.path, error = %message, "Fetch failed, showing fallback");
                self.update(|s| {
                    s.data = T::fallback(&message);
                    s.loading = false;
                    s.error = Some(message);
                });
                Err(e)
            }
        }
    }

    /// Replaces the value, as if fetched.
    pub fn apply(&self, data: T) {
        self.update(|s| {
            s.data = data;
            s.error = None;
        });
    }

    /// Updates the value whenever `event` is dispatched on `registry`.
    ///
    /// Payloads that do not deserialize into `T` are ignored. Keep the
    /// returned handler to stop following with [`EventRegistry::off`].
    pub fn follow(&self, registry: &EventRegistry, event: &str) -> EventHandler {
        let resource = self.clone();
        let name = event.to_string();
        let follower = handler(move |payload| {
            match serde_json::from_value::<T>(payload.clone()) {
                Ok(data) => resource.apply(data),
                Err(e) => debug!(event = %name, error = %e, "Payload does not match resource"),
            }
        });
        registry.on(event, follower.clone());
        follower
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    /// Current value.
    #[must_use]
    pub fn data(&self) -> T {
        self.inner.state.borrow().data.clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }

    fn is_active(&self) -> bool {
        !self.inner.cancel.is_cancelled() && self.inner.live.is_live()
    }

    fn update(&self, f: impl FnOnce(&mut ResourceState<T>)) {
        if self.is_active() {
            self.inner.state.send_modify(f);
        }
    }
}

// ============================================================================
// AgentStatus
// ============================================================================

/// Agent availability as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    /// Whether the agent is running.
    pub is_active: bool,

    /// Agent state label.
    #[serde(default)]
    pub agent_status: String,

    /// Status message.
    #[serde(default)]
    pub message: Option<String>,

    /// Text to show while offline.
    #[serde(default)]
    pub offline_message: Option<String>,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self {
            is_active: false,
            agent_status: "unknown".to_string(),
            message: None,
            offline_message: None,
        }
    }
}

impl Snapshot for AgentStatus {
    fn fallback(error: &str) -> Self {
        Self {
            is_active: false,
            agent_status: "offline".to_string(),
            message: Some(error.to_string()),
            offline_message: Some("Agent is unreachable. Retrying in the background.".to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
