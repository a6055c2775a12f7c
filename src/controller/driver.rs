//! Driver task.
//!
//! One task per controller serializes every transition. Each loop turn
//! races three sources:
//!
//! - the lifetime token (destroy)
//! - the command channel (connect, disconnect, reconnect, send)
//! - the current [`Phase`] (attempt result, inbound frame, retry timer,
//!   poll tick)
//!
//! Everything a phase waits on is owned by the phase, so replacing the
//! phase cancels it: a superseded attempt, a cleared retry timer and a
//! stopped poller are all just dropped.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::{Sleep, sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::adapter::{CloseReason, Signal};
use crate::api::ApiClient;
use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::identifiers::LinkId;
use crate::poller::{FallbackPoller, PollTarget};
use crate::transport::{Connector, Frame, Link};

use super::{ConnectionState, Shared};

// ============================================================================
// Types
// ============================================================================

/// Requests from controller handles.
pub(super) enum Command {
    Connect,
    Reconnect,
    Disconnect,
    Send { operation: String, text: String },
    Shutdown,
}

/// Fallback polling settings, present when a REST client was supplied.
pub(super) struct PollPlan {
    pub(super) api: Arc<dyn ApiClient>,
    pub(super) path: String,
    pub(super) event: String,
    pub(super) interval: Duration,
    pub(super) timeout: Duration,
}

/// Pending connection attempt.
type Attempt = BoxFuture<'static, Result<Box<dyn Link>>>;

/// What the driver is currently waiting on.
enum Phase {
    Idle,
    Connecting(Attempt),
    Connected { link: Box<dyn Link>, id: LinkId },
    Waiting(Pin<Box<Sleep>>),
    Fallback(Option<FallbackPoller>),
}

/// Completion of the current phase.
enum Wake {
    Attempt(Result<Box<dyn Link>>),
    Frame(Option<Result<Frame>>),
    RetryDue,
    PollDue,
}

/// One loop turn's outcome.
enum Step {
    Command(Command),
    Wake(Wake),
    Shutdown,
}

impl Phase {
    /// Waits for this phase to produce something. Cancel safe.
    async fn wake(&mut self) -> Wake {
        match self {
            Self::Idle | Self::Fallback(None) => pending().await,
            Self::Connecting(attempt) => Wake::Attempt(attempt.as_mut().await),
            Self::Connected { link, .. } => Wake::Frame(link.recv().await),
            Self::Waiting(timer) => {
                timer.as_mut().await;
                Wake::RetryDue
            }
            Self::Fallback(Some(poller)) => {
                poller.tick().await;
                Wake::PollDue
            }
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

pub(super) struct Driver {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    connect_timeout: Duration,
    poll: Option<PollPlan>,
    commands: mpsc::UnboundedReceiver<Command>,
    phase: Phase,
}

impl Driver {
    pub(super) fn new(
        shared: Arc<Shared>,
        connector: Arc<dyn Connector>,
        backoff: BackoffPolicy,
        max_attempts: u32,
        connect_timeout: Duration,
        poll: Option<PollPlan>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            shared,
            connector,
            backoff,
            max_attempts,
            connect_timeout,
            poll,
            commands,
            phase: Phase::Idle,
        }
    }

    /// Runs until destroyed or every handle is dropped.
    pub(super) async fn run(mut self) {
        let lifetime = self.shared.lifetime.clone();

        loop {
            let step = tokio::select! {
                biased;

                _ = lifetime.cancelled() => Step::Shutdown,

                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Shutdown,
                },

                wake = self.phase.wake() => Step::Wake(wake),
            };

            match step {
                Step::Command(Command::Shutdown) | Step::Shutdown => break,
                Step::Command(command) => self.handle_command(command).await,
                Step::Wake(wake) => self.handle_wake(wake).await,
            }
        }

        self.shutdown().await;
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => match self.phase {
                Phase::Connected { .. } => debug!("Already connected, connect ignored"),
                Phase::Fallback(_) => warn!("In fallback, use reconnect() to leave it"),
                Phase::Idle | Phase::Connecting(_) | Phase::Waiting(_) => self.begin_attempt(),
            },

            Command::Reconnect => {
                info!("Manual reconnect");
                if self.teardown().await {
                    self.shared.adapter.on_close(CloseReason::Lost);
                }
                self.shared.attempts.store(0, Ordering::SeqCst);
                self.begin_attempt();
            }

            Command::Disconnect => {
                self.teardown().await;
                self.shared.adapter.on_close(CloseReason::Disconnected);
                self.shared.attempts.store(0, Ordering::SeqCst);
                self.set_state(ConnectionState::Disconnected);
                info!("Disconnected");
            }

            Command::Send { operation, text } => {
                let Phase::Connected { link, id } = &mut self.phase else {
                    warn!(operation = %operation, "Link closed before send, dropped");
                    return;
                };

                trace!(operation = %operation, link = %id, "Sending frame");
                if let Err(e) = link.send(text).await {
                    warn!(operation = %operation, error = %e, "Send failed");
                }
            }

            Command::Shutdown => {}
        }
    }

    // ========================================================================
    // Phase Completions
    // ========================================================================

    async fn handle_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Attempt(Ok(link)) => {
                let id = LinkId::generate();
                info!(endpoint = self.connector.endpoint(), link = %id, "Connected");

                self.phase = Phase::Connected { link, id };
                *self.shared.link_id.lock() = Some(id);
                self.shared.attempts.store(0, Ordering::SeqCst);
                self.shared.adapter.on_open(id);
                self.set_state(ConnectionState::Connected);
            }

            Wake::Attempt(Err(e)) => {
                let endpoint = self.connector.endpoint();
                if e.is_recoverable() {
                    warn!(endpoint, error = %e, "Connection attempt failed");
                } else {
                    error!(endpoint, error = %e, "Connection attempt failed, retrying anyway");
                }
                self.phase = Phase::Idle;
                self.fail();
            }

            Wake::Frame(Some(Ok(frame))) => {
                let signal = self.shared.adapter.on_frame(frame, &self.shared.live);
                if signal == Signal::Connected {
                    self.shared.attempts.store(0, Ordering::SeqCst);
                }
            }

            Wake::Frame(Some(Err(e))) => {
                warn!(error = %e, "Link failed");
                self.link_lost().await;
            }

            Wake::Frame(None) => {
                info!("Link closed by server");
                self.link_lost().await;
            }

            Wake::RetryDue => self.begin_attempt(),

            Wake::PollDue => {
                if let Phase::Fallback(Some(poller)) = &self.phase {
                    poller.poll();
                }
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Replaces the current phase with a fresh attempt.
    fn begin_attempt(&mut self) {
        let connector = Arc::clone(&self.connector);
        let limit = self.connect_timeout;

        debug!(
            endpoint = connector.endpoint(),
            attempt = self.shared.attempts.load(Ordering::SeqCst) + 1,
            "Connecting"
        );

        self.phase = Phase::Connecting(Box::pin(async move {
            match timeout(limit, connector.connect()).await {
                Ok(result) => result,
                Err(_) => Err(Error::connection_timeout(limit.as_millis() as u64)),
            }
        }));
        self.set_state(ConnectionState::Connecting);
    }

    /// Records a failure and schedules a retry or enters fallback.
    fn fail(&mut self) {
        let attempts = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if attempts >= self.max_attempts {
            self.enter_fallback(attempts);
            return;
        }

        let delay = self.backoff.delay(attempts - 1);
        info!(
            attempts,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retry scheduled"
        );

        self.phase = Phase::Waiting(Box::pin(sleep(delay)));
        self.set_state(ConnectionState::Reconnecting);
    }

    fn enter_fallback(&mut self, attempts: u32) {
        warn!(attempts, "Retries exhausted, falling back to polling");

        let poller = self.poll.as_ref().map(|plan| {
            let target = PollTarget {
                api: Arc::clone(&plan.api),
                path: plan.path.clone(),
                event: plan.event.clone(),
                timeout: plan.timeout,
                registry: Arc::clone(self.shared.adapter.registry()),
                live: Arc::clone(&self.shared.live),
                last_error: Arc::clone(&self.shared.last_error),
            };
            FallbackPoller::start(target, plan.interval, self.shared.lifetime.child_token())
        });

        self.phase = Phase::Fallback(poller);
        self.set_state(ConnectionState::Fallback);
    }

    async fn link_lost(&mut self) {
        self.teardown().await;
        self.shared.adapter.on_close(CloseReason::Lost);
        self.fail();
    }

    /// Drops the current phase, closing the link if one is open.
    ///
    /// Returns `true` if a link was closed.
    async fn teardown(&mut self) -> bool {
        match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Connected { mut link, id } => {
                link.close().await;
                self.shared.link_id.lock().take();
                debug!(link = %id, "Link closed");
                true
            }
            Phase::Fallback(Some(poller)) => {
                poller.stop();
                false
            }
            Phase::Waiting(_) => {
                debug!("Pending retry cleared");
                false
            }
            Phase::Idle | Phase::Connecting(_) | Phase::Fallback(None) => false,
        }
    }

    /// Final teardown: retry timer, poller, then transport. Handlers are
    /// released last.
    async fn shutdown(&mut self) {
        self.teardown().await;
        self.shared.adapter.on_close(CloseReason::Disconnected);
        self.shared.adapter.registry().clear();
        debug!("Driver stopped");
    }

    /// Publishes `state` unless the owner is gone.
    fn set_state(&self, state: ConnectionState) {
        if !self.shared.live.is_live() {
            return;
        }

        let previous = self.shared.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "State changed");
        }
    }
}
