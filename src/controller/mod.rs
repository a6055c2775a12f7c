//! Connection lifecycle controller.
//!
//! A [`Controller`] owns one transport ([`Connector`] plus [`Adapter`]) and
//! drives it through the connection state machine. All transitions run on
//! a single driver task, so no two connection attempts ever overlap.
//!
//! # State Machine
//!
//! | From | Trigger | To |
//! |------|---------|----|
//! | `disconnected` | `connect()` | `connecting` |
//! | `connecting` | link opened | `connected` (attempts reset) |
//! | `connecting` | failure, attempts remain | `reconnecting` |
//! | `reconnecting` | backoff timer fires | `connecting` |
//! | `connecting` | failure, attempts exhausted | `fallback` |
//! | `connected` | link lost | `reconnecting` |
//! | `fallback` | `reconnect()` | `connecting` (attempts reset, poller stopped) |
//! | any | `disconnect()` | `disconnected` |
//!
//! # Example
//!
//! ```ignore
//! use live_sync::{Controller, HttpApiClient, SyncConfig, handler};
//!
//! let config = SyncConfig::new("http://localhost:3001/api/events");
//! let api = HttpApiClient::new("http://localhost:3001", config.request_timeout)?;
//! let controller = Controller::push_stream(config, Some(Arc::new(api)))?;
//!
//! controller.on("status_update", handler(|status| println!("{status}")));
//! controller.connect();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapter::{Adapter, PushStreamAdapter};
use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::identifiers::LinkId;
use crate::lifecycle::Liveness;
use crate::poller::ErrorSlot;
use crate::registry::{EventHandler, EventRegistry};
use crate::transport::{Connector, SseConnector};

use driver::{Command, Driver, PollPlan};

// ============================================================================
// Submodules
// ============================================================================

/// Driver task and connection phases.
mod driver;

// ============================================================================
// ConnectionState
// ============================================================================

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// Link open, events flowing.
    Connected,
    /// Waiting for the backoff timer before the next attempt.
    Reconnecting,
    /// Retries exhausted; polling over REST until a manual reconnect.
    Fallback,
}

impl ConnectionState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Fallback => "fallback",
        }
    }

    /// Returns `true` while the push link is open.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` when data is only arriving through polling.
    #[inline]
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Reconnecting | Self::Fallback)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between handles and the driver task.
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) attempts: AtomicU32,
    pub(crate) link_id: Mutex<Option<LinkId>>,
    pub(crate) last_error: ErrorSlot,
    pub(crate) live: Arc<Liveness>,
    pub(crate) lifetime: CancellationToken,
    pub(crate) adapter: Arc<dyn Adapter>,
}

// ============================================================================
// Controller
// ============================================================================

/// Handle to one connection lifecycle.
///
/// Cheap to clone; every clone controls the same driver task. The task
/// stops once the last clone is dropped.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("link_id", &self.link_id())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Controller - Construction
// ============================================================================

impl Controller {
    /// Creates a controller and spawns its driver task.
    ///
    /// The controller starts `disconnected`; call [`connect`](Self::connect).
    /// Without an `api` client, fallback is still entered but nothing is
    /// polled.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid or no Tokio
    ///   runtime is running
    pub fn new(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        adapter: Arc<dyn Adapter>,
        api: Option<Arc<dyn ApiClient>>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Controller must be created inside a Tokio runtime"))?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Arc::new(Shared {
            state,
            attempts: AtomicU32::new(0),
            link_id: Mutex::new(None),
            last_error: Arc::new(Mutex::new(None)),
            live: Arc::new(Liveness::new()),
            lifetime: CancellationToken::new(),
            adapter: Arc::clone(&adapter),
        });

        let backoff = config.backoff_policy(adapter.default_backoff());
        let poll = api.map(|api| PollPlan {
            api,
            path: config.snapshot_path.clone(),
            event: config.snapshot_event.clone(),
            interval: config.poll_interval,
            timeout: config.request_timeout,
        });

        debug!(endpoint = connector.endpoint(), "Controller created");

        let driver = Driver::new(
            Arc::clone(&shared),
            connector,
            backoff,
            config.max_reconnect_attempts,
            config.request_timeout,
            poll,
            commands_rx,
        );
        runtime.spawn(driver.run());

        Ok(Self {
            shared,
            commands: commands_tx,
        })
    }

    /// Creates a push-stream (SSE) controller for `config.endpoint`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] or [`Error::Url`] for an invalid configuration
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn push_stream(config: SyncConfig, api: Option<Arc<dyn ApiClient>>) -> Result<Self> {
        let connector = SseConnector::new(config.endpoint_url()?, config.request_timeout)?;
        Self::new(
            config,
            Arc::new(connector),
            Arc::new(PushStreamAdapter::new()),
            api,
        )
    }
}

// ============================================================================
// Controller - Lifecycle
// ============================================================================

impl Controller {
    /// Starts connecting.
    ///
    /// No-op while connected; ignored in fallback (use
    /// [`reconnect`](Self::reconnect)). Supersedes an attempt in progress.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Closes the link, cancels retries and polling, and resets attempts.
    ///
    /// The state becomes `disconnected` and stays there until
    /// [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Resets the attempt counter, clears any pending retry or poller and
    /// issues one fresh connection attempt.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Permanently stops this controller.
    ///
    /// Marks it unmounted first, so no state change or dispatch happens
    /// afterwards even for work that was already scheduled.
    pub fn destroy(&self) {
        if self.shared.live.mark_unmounted() {
            debug!("Controller destroyed");
        }
        self.shared.lifetime.cancel();
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Sends a text frame over the open link.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless the state is `connected`
    /// - [`Error::Shutdown`] if the controller was destroyed
    pub fn send_text(&self, operation: &str, text: String) -> Result<()> {
        if !self.shared.live.is_live() {
            return Err(Error::Shutdown);
        }
        if !self.state().is_connected() {
            return Err(Error::not_connected(operation));
        }

        self.commands
            .send(Command::Send {
                operation: operation.to_string(),
                text,
            })
            .map_err(|_| Error::Shutdown)
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Controller already shut down, command ignored");
        }
    }
}

// ============================================================================
// Controller - Accessors
// ============================================================================

impl Controller {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive failed attempts since the last success or reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Identifier of the open link, if connected.
    #[must_use]
    pub fn link_id(&self) -> Option<LinkId> {
        *self.shared.link_id.lock()
    }

    /// Last fallback poll error; cleared by the next successful poll.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Registry receiving this controller's events.
    #[must_use]
    pub fn registry(&self) -> &Arc<EventRegistry> {
        self.shared.adapter.registry()
    }

    /// Registers `handler` for `event`.
    pub fn on(&self, event: impl Into<String>, handler: EventHandler) {
        self.registry().on(event, handler);
    }

    /// Removes `handler` from `event`.
    pub fn off(&self, event: &str, handler: &EventHandler) {
        self.registry().off(event, handler);
    }

    /// Unmounted flag of this controller.
    #[must_use]
    pub fn liveness(&self) -> &Arc<Liveness> {
        &self.shared.live
    }

    /// Token cancelled when the controller is destroyed.
    #[must_use]
    pub fn lifetime(&self) -> &CancellationToken {
        &self.shared.lifetime
    }
}

// ============================================================================
// Tests
// ============================================================================
