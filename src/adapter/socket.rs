//! Session socket adapter.
//!
//! Inbound frames are `{"event": name, "data": payload}` and are dispatched
//! by name, whether they address a session or the whole process. The
//! adapter additionally tracks which sessions were requested and which the
//! server confirmed, so [`SessionSocket::subscribe_to_session`] never emits
//! a duplicate.
//!
//! Subscriptions are not replayed after the link is lost and re-opened;
//! [`SessionSocket::subscribed_sessions`] keeps the previous set so the
//! caller can decide whether to resubscribe.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{debug, error, info, trace, warn};

use crate::api::ApiClient;
use crate::config::{BackoffProfile, SyncConfig};
use crate::controller::{ConnectionState, Controller};
use crate::error::{Error, Result};
use crate::identifiers::{LinkId, SessionId};
use crate::lifecycle::Liveness;
use crate::protocol::{SocketCommand, SocketEvent, SocketFrame};
use crate::registry::{EventHandler, EventRegistry};
use crate::transport::{Connector, Frame, WsConnector};

use super::{Adapter, CloseReason, Signal};

// ============================================================================
// SessionSocketAdapter
// ============================================================================

/// Requested and confirmed subscriptions.
#[derive(Debug, Default)]
struct Subscriptions {
    /// Sent but not yet confirmed.
    pending: FxHashSet<SessionId>,
    /// Confirmed by the server.
    confirmed: FxHashSet<SessionId>,
}

/// Adapter for the bidirectional session socket.
#[derive(Debug, Default)]
pub struct SessionSocketAdapter {
    registry: Arc<EventRegistry>,
    subscriptions: Mutex<Subscriptions>,
}

impl SessionSocketAdapter {
    /// Creates an adapter with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the server confirmed a subscription to `id`.
    #[must_use]
    pub fn is_subscribed(&self, id: &SessionId) -> bool {
        self.subscriptions.lock().confirmed.contains(id)
    }

    /// Returns `true` if a subscription to `id` was sent and awaits
    /// confirmation.
    #[must_use]
    pub fn is_pending(&self, id: &SessionId) -> bool {
        self.subscriptions.lock().pending.contains(id)
    }

    /// Confirmed sessions, sorted.
    #[must_use]
    pub fn subscribed_sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<_> = self.subscriptions.lock().confirmed.iter().cloned().collect();
        sessions.sort();
        sessions
    }

    /// Marks `id` as requested. Returns `false` if it already is, or is
    /// confirmed.
    fn request(&self, id: &SessionId) -> bool {
        let mut subs = self.subscriptions.lock();
        if subs.confirmed.contains(id) {
            return false;
        }
        subs.pending.insert(id.clone())
    }

    /// Forgets `id` locally, requested or confirmed.
    fn forget(&self, id: &SessionId) {
        let mut subs = self.subscriptions.lock();
        subs.pending.remove(id);
        subs.confirmed.remove(id);
    }

    fn track(&self, event: &SocketEvent) -> Signal {
        match event {
            SocketEvent::Connected => {
                info!("Session socket acknowledged by server");
                return Signal::Connected;
            }
            SocketEvent::SubscriptionConfirmed { session_id } => {
                debug!(session = %session_id, "Subscription confirmed");
                let mut subs = self.subscriptions.lock();
                subs.pending.remove(session_id);
                subs.confirmed.insert(session_id.clone());
            }
            SocketEvent::UnsubscriptionConfirmed { session_id } => {
                // A resubscribe sent after the unsubscribe stays pending.
                debug!(session = %session_id, "Unsubscription confirmed");
                self.subscriptions.lock().confirmed.remove(session_id);
            }
            SocketEvent::SessionNotFound { session_id } => {
                warn!(session = %session_id, "Session not found");
                self.forget(session_id);
            }
            SocketEvent::Error { message } => warn!(reason = %message, "Server reported error"),
            _ => {}
        }
        Signal::Continue
    }
}

impl Adapter for SessionSocketAdapter {
    fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    fn default_backoff(&self) -> BackoffProfile {
        BackoffProfile::Smooth
    }

    fn on_open(&self, link: LinkId) {
        debug!(%link, "Session socket open");
    }

    fn on_frame(&self, frame: Frame, live: &Liveness) -> Signal {
        let parsed = match frame {
            Frame::Text(text) => SocketFrame::parse(&text),
            Frame::Event { event, data } => serde_json::from_str(&data)
                .map(|payload| SocketFrame::new(event, payload))
                .map_err(Error::from),
        };

        let frame = match parsed {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed socket frame");
                return Signal::Continue;
            }
        };

        trace!(event = %frame.event, "Socket event received");
        let signal = self.track(&frame.to_event());
        self.registry
            .dispatch_while(&frame.event, &frame.data, || live.is_live());
        signal
    }

    fn on_close(&self, reason: CloseReason) {
        let mut subs = self.subscriptions.lock();
        // Requests on a closed link are never confirmed.
        subs.pending.clear();
        match reason {
            CloseReason::Disconnected => subs.confirmed.clear(),
            CloseReason::Lost => {
                if !subs.confirmed.is_empty() {
                    debug!(
                        sessions = subs.confirmed.len(),
                        "Link lost, subscriptions not replayed"
                    );
                }
            }
        }
    }
}

// ============================================================================
// SessionSocket
// ============================================================================

/// Controller plus outbound operations for the session socket.
///
/// Every outbound operation is a logged no-op while not connected.
#[derive(Debug, Clone)]
pub struct SessionSocket {
    controller: Controller,
    adapter: Arc<SessionSocketAdapter>,
}

impl SessionSocket {
    /// Creates a socket for the `ws://`/`wss://` endpoint in `config`.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Config`] or [`crate::Error::Url`] for an invalid
    ///   configuration or a non-WebSocket scheme
    pub fn new(config: SyncConfig, api: Option<Arc<dyn ApiClient>>) -> Result<Self> {
        let connector = WsConnector::new(config.endpoint_url()?, config.request_timeout)?;
        Self::with_connector(config, Arc::new(connector), api)
    }

    /// Creates a socket over any connector delivering socket frames.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for an invalid configuration.
    pub fn with_connector(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        api: Option<Arc<dyn ApiClient>>,
    ) -> Result<Self> {
        let adapter = Arc::new(SessionSocketAdapter::new());
        let controller = Controller::new(
            config,
            connector,
            Arc::clone(&adapter) as Arc<dyn Adapter>,
            api,
        )?;
        Ok(Self {
            controller,
            adapter,
        })
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Subscribes to a session's output.
    ///
    /// Returns `false` without sending if the session is already requested
    /// or confirmed, or the socket is not connected.
    pub fn subscribe_to_session(&self, id: impl Into<SessionId>) -> bool {
        let id = id.into();
        if !self.adapter.request(&id) {
            debug!(session = %id, "Already subscribed");
            return false;
        }

        let sent = self.emit(&SocketCommand::SubscribeToSession(id.clone()));
        if !sent {
            self.adapter.subscriptions.lock().pending.remove(&id);
        }
        sent
    }

    /// Unsubscribes from a session's output.
    ///
    /// The session is forgotten locally once the request is sent, so an
    /// immediate resubscribe is emitted.
    pub fn unsubscribe_from_session(&self, id: impl Into<SessionId>) -> bool {
        let id = id.into();
        let sent = self.emit(&SocketCommand::UnsubscribeFromSession(id.clone()));
        if sent {
            self.adapter.forget(&id);
        }
        sent
    }

    /// Writes `input` to a session's terminal.
    pub fn send_input(&self, id: impl Into<SessionId>, input: impl Into<String>) -> bool {
        self.emit(&SocketCommand::SendInput {
            id: id.into(),
            input: input.into(),
        })
    }

    /// Resizes a session's terminal.
    pub fn resize(&self, id: impl Into<SessionId>, cols: u16, rows: u16) -> bool {
        self.emit(&SocketCommand::TerminalResize {
            id: id.into(),
            cols,
            rows,
        })
    }

    fn emit(&self, command: &SocketCommand) -> bool {
        let operation = command.event_name();
        let sent = command
            .to_frame()
            .and_then(|frame| self.controller.send_text(operation, frame));

        match sent {
            Ok(()) => true,
            Err(e) => {
                error!(
                    operation,
                    session = %command.session_id(),
                    error = %e,
                    "Socket command not sent"
                );
                false
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Underlying controller.
    #[inline]
    #[must_use]
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Sessions the server confirmed.
    #[must_use]
    pub fn subscribed_sessions(&self) -> Vec<SessionId> {
        self.adapter.subscribed_sessions()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    /// Starts connecting.
    pub fn connect(&self) {
        self.controller.connect();
    }

    /// Disconnects and forgets all subscriptions.
    pub fn disconnect(&self) {
        self.controller.disconnect();
    }

    /// Registers `handler` for `event`.
    pub fn on(&self, event: impl Into<String>, handler: EventHandler) {
        self.controller.on(event, handler);
    }

    /// Removes `handler` from `event`.
    pub fn off(&self, event: &str, handler: &EventHandler) {
        self.controller.off(event, handler);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    use crate::registry::handler;
    use crate::transport::Link;

    fn text(event: &str, data: Value) -> Frame {
        Frame::Text(json!({ "event": event, "data": data }).to_string())
    }

    // ------------------------------------------------------------------------
    // Adapter
    // ------------------------------------------------------------------------

    #[test]
    fn test_session_and_global_events_share_dispatch() {
        let adapter = SessionSocketAdapter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["terminal_output", "agent_status_changed"] {
            let sink = Arc::clone(&seen);
            adapter
                .registry()
                .on(name, handler(move |v| sink.lock().push(v.clone())));
        }
        let live = Liveness::new();

        adapter.on_frame(
            text("terminal_output", json!({ "sessionId": "s1", "data": "hi" })),
            &live,
        );
        adapter.on_frame(text("agent_status_changed", json!({ "agentId": "a" })), &live);

        assert_eq!(
            *seen.lock(),
            vec![
                json!({ "sessionId": "s1", "data": "hi" }),
                json!({ "agentId": "a" })
            ]
        );
    }

    #[test]
    fn test_subscription_bookkeeping() {
        let adapter = SessionSocketAdapter::new();
        let live = Liveness::new();
        let s1 = SessionId::new("s1");

        adapter.on_frame(text("subscription_confirmed", json!({ "sessionId": "s1" })), &live);
        adapter.on_frame(text("subscription_confirmed", json!("s2")), &live);
        assert!(adapter.is_subscribed(&s1));
        assert_eq!(adapter.subscribed_sessions().len(), 2);

        adapter.on_frame(text("unsubscription_confirmed", json!({ "sessionId": "s1" })), &live);
        adapter.on_frame(text("session_not_found", json!({ "sessionId": "s2" })), &live);
        assert!(adapter.subscribed_sessions().is_empty());
    }

    #[test]
    fn test_lost_link_keeps_subscriptions_disconnect_clears() {
        let adapter = SessionSocketAdapter::new();
        adapter.on_frame(
            text("subscription_confirmed", json!({ "sessionId": "s1" })),
            &Liveness::new(),
        );

        adapter.on_close(CloseReason::Lost);
        assert_eq!(adapter.subscribed_sessions(), vec![SessionId::new("s1")]);

        adapter.on_close(CloseReason::Disconnected);
        assert!(adapter.subscribed_sessions().is_empty());
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let adapter = SessionSocketAdapter::new();
        let signal = adapter.on_frame(Frame::Text("not json".into()), &Liveness::new());
        assert_eq!(signal, Signal::Continue);
    }

    #[test]
    fn test_connected_frame_signals() {
        let adapter = SessionSocketAdapter::new();
        let signal = adapter.on_frame(text("connected", json!({})), &Liveness::new());
        assert_eq!(signal, Signal::Connected);
    }

    // ------------------------------------------------------------------------
    // SessionSocket
    // ------------------------------------------------------------------------

    /// Connector whose links record outbound frames and, when `confirm` is
    /// set, answer subscribe frames with a confirmation.
    #[derive(Default)]
    struct EchoConnector {
        confirm: bool,
        sent: Arc<Mutex<Vec<Value>>>,
        inbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    }

    impl EchoConnector {
        /// Delivers a server event on the most recent link.
        fn reply(&self, event: &str, data: Value) {
            if let Some(tx) = self.inbound.lock().as_ref() {
                let _ = tx.send(json!({ "event": event, "data": data }).to_string());
            }
        }

        fn sent_events(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .map(|frame| frame["event"].as_str().unwrap_or_default().to_string())
                .collect()
        }
    }

    struct EchoLink {
        confirm: bool,
        sent: Arc<Mutex<Vec<Value>>>,
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Connector for EchoConnector {
        async fn connect(&self) -> Result<Box<dyn Link>> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.inbound.lock() = Some(tx.clone());
            Ok(Box::new(EchoLink {
                confirm: self.confirm,
                sent: Arc::clone(&self.sent),
                tx,
                rx,
            }))
        }

        fn endpoint(&self) -> &str {
            "mock://socket"
        }
    }

    #[async_trait]
    impl Link for EchoLink {
        async fn recv(&mut self) -> Option<Result<Frame>> {
            self.rx.recv().await.map(|t| Ok(Frame::Text(t)))
        }

        async fn send(&mut self, text: String) -> Result<()> {
            let frame: Value = serde_json::from_str(&text)?;
            if self.confirm && frame["event"] == "subscribe_to_session" {
                let reply = json!({
                    "event": "subscription_confirmed",
                    "data": { "sessionId": frame["data"] },
                });
                let _ = self.tx.send(reply.to_string());
            }
            self.sent.lock().push(frame);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    fn socket_with(confirm: bool) -> (SessionSocket, Arc<EchoConnector>) {
        let connector = Arc::new(EchoConnector {
            confirm,
            ..Default::default()
        });
        let config = SyncConfig::new("ws://localhost:3001/ws");
        let socket = SessionSocket::with_connector(
            config,
            Arc::clone(&connector) as Arc<dyn Connector>,
            None,
        )
        .expect("socket");
        (socket, connector)
    }

    fn socket() -> (SessionSocket, Arc<Mutex<Vec<Value>>>) {
        let (socket, connector) = socket_with(true);
        let sent = Arc::clone(&connector.sent);
        (socket, sent)
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_is_noop_when_not_connected() {
        let (socket, sent) = socket();

        assert!(!socket.subscribe_to_session("s1"));
        assert!(!socket.send_input("s1", "ls\n"));
        assert!(!socket.resize("s1", 80, 24));
        sleep(Duration::from_millis(10)).await;

        assert!(sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_skips_duplicates_once_confirmed() {
        let (socket, sent) = socket();
        socket.connect();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(socket.state(), ConnectionState::Connected);

        assert!(socket.subscribe_to_session("s1"));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(socket.subscribed_sessions(), vec![SessionId::new("s1")]);

        assert!(!socket.subscribe_to_session("s1"));
        assert!(socket.send_input("s1", "ls\n"));
        assert!(socket.resize("s1", 120, 40));
        sleep(Duration::from_millis(10)).await;

        let sent = sent.lock();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], json!({ "event": "subscribe_to_session", "data": "s1" }));
        assert_eq!(
            sent[1],
            json!({ "event": "send_input", "data": { "id": "s1", "input": "ls\n" } })
        );
        assert_eq!(
            sent[2],
            json!({ "event": "terminal_resize", "data": { "id": "s1", "cols": 120, "rows": 40 } })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_forgets_subscriptions() {
        let (socket, _) = socket();
        socket.connect();
        sleep(Duration::from_millis(10)).await;
        socket.subscribe_to_session("s1");
        sleep(Duration::from_millis(10)).await;

        socket.disconnect();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(socket.state(), ConnectionState::Disconnected);
        assert!(socket.subscribed_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_twice_before_confirmation_sends_once() {
        let (socket, connector) = socket_with(false);
        socket.connect();
        sleep(Duration::from_millis(10)).await;
        let s1 = SessionId::new("s1");

        assert!(socket.subscribe_to_session("s1"));
        assert!(!socket.subscribe_to_session("s1"));
        sleep(Duration::from_millis(10)).await;

        assert_eq!(connector.sent_events(), vec!["subscribe_to_session"]);
        assert!(socket.adapter.is_pending(&s1));
        assert!(socket.subscribed_sessions().is_empty());

        connector.reply("subscription_confirmed", json!({ "sessionId": "s1" }));
        sleep(Duration::from_millis(10)).await;

        assert!(!socket.adapter.is_pending(&s1));
        assert_eq!(socket.subscribed_sessions(), vec![s1]);
        assert!(!socket.subscribe_to_session("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_session_can_be_requested_again() {
        let (socket, connector) = socket_with(false);
        socket.connect();
        sleep(Duration::from_millis(10)).await;

        assert!(socket.subscribe_to_session("gone"));
        connector.reply("session_not_found", json!({ "sessionId": "gone" }));
        sleep(Duration::from_millis(10)).await;

        assert!(socket.subscribe_to_session("gone"));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            connector.sent_events(),
            vec!["subscribe_to_session", "subscribe_to_session"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_before_unsubscribe_confirmation_is_kept() {
        let (socket, connector) = socket_with(false);
        socket.connect();
        sleep(Duration::from_millis(10)).await;
        let s1 = SessionId::new("s1");

        socket.subscribe_to_session("s1");
        connector.reply("subscription_confirmed", json!({ "sessionId": "s1" }));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(socket.subscribed_sessions(), vec![s1.clone()]);

        assert!(socket.unsubscribe_from_session("s1"));
        assert!(socket.subscribe_to_session("s1"));

        // Server answers both requests in order.
        connector.reply("unsubscription_confirmed", json!({ "sessionId": "s1" }));
        sleep(Duration::from_millis(10)).await;
        assert!(socket.adapter.is_pending(&s1));

        connector.reply("subscription_confirmed", json!({ "sessionId": "s1" }));
        sleep(Duration::from_millis(10)).await;

        assert_eq!(
            connector.sent_events(),
            vec![
                "subscribe_to_session",
                "unsubscribe_from_session",
                "subscribe_to_session"
            ]
        );
        assert_eq!(socket.subscribed_sessions(), vec![s1]);
    }

    #[test]
    fn test_lost_link_drops_pending_requests() {
        let adapter = SessionSocketAdapter::new();
        let s1 = SessionId::new("s1");
        assert!(adapter.request(&s1));
        assert!(!adapter.request(&s1));

        adapter.on_close(CloseReason::Lost);

        assert!(!adapter.is_pending(&s1));
        assert!(adapter.request(&s1));
    }
}
