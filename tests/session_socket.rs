//! Session socket against a real local WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use live_sync::{ConnectionState, SessionId, SessionSocket, SyncConfig, handler};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Test Server
// ============================================================================

#[derive(Default)]
struct ServerLog {
    subscribes: AtomicUsize,
    connections: AtomicUsize,
}

/// Serves sessions; the first connection is dropped after `drop_first_after`
/// client frames when set.
async fn serve(drop_first_after: Option<usize>) -> Result<(String, Arc<ServerLog>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    let log = Arc::new(ServerLog::default());

    let server_log = Arc::clone(&log);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let n = server_log.connections.fetch_add(1, Ordering::SeqCst);
            let log = Arc::clone(&server_log);
            let limit = if n == 0 { drop_first_after } else { None };
            tokio::spawn(async move {
                let _ = handle(stream, log, limit).await;
            });
        }
    });

    Ok((url, log))
}

fn event(name: &str, data: Value) -> String {
    json!({ "event": name, "data": data }).to_string()
}

async fn handle(
    stream: tokio::net::TcpStream,
    log: Arc<ServerLog>,
    limit: Option<usize>,
) -> Result<()> {
    let mut ws = accept_async(stream).await?;
    ws.send(Message::Text(event("connected", json!({})).into())).await?;

    let mut received = 0;
    while let Some(message) = ws.next().await {
        let Message::Text(text) = message? else {
            continue;
        };
        let frame: Value = serde_json::from_str(text.as_str())?;
        received += 1;

        let replies = match frame["event"].as_str() {
            Some("subscribe_to_session") => {
                log.subscribes.fetch_add(1, Ordering::SeqCst);
                let session = &frame["data"];
                vec![
                    event("subscription_confirmed", json!({ "sessionId": session })),
                    event("initial_terminal_state", json!({ "sessionId": session, "data": "$ " })),
                ]
            }
            Some("send_input") => {
                let session = &frame["data"]["id"];
                vec![
                    event("input_received", json!({ "sessionId": session })),
                    event(
                        "terminal_output",
                        json!({ "sessionId": session, "data": frame["data"]["input"] }),
                    ),
                    event("agent_status_changed", json!({ "agentId": "a1", "status": "busy" })),
                ]
            }
            _ => Vec::new(),
        };

        for reply in replies {
            ws.send(Message::Text(reply.into())).await?;
        }

        if limit.is_some_and(|limit| received >= limit) {
            ws.close(None).await?;
            break;
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(url: &str) -> SyncConfig {
    SyncConfig::new(url)
        .with_base_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_millis(200))
        .with_request_timeout(Duration::from_secs(2))
}

async fn wait_for(
    states: &mut watch::Receiver<ConnectionState>,
    target: ConnectionState,
) -> Result<()> {
    timeout(Duration::from_secs(5), async {
        loop {
            if *states.borrow_and_update() == target {
                return Ok::<_, anyhow::Error>(());
            }
            states.changed().await?;
        }
    })
    .await
    .with_context(|| format!("timed out waiting for {target}"))?
}

async fn wait_until(check: impl Fn() -> bool) -> Result<()> {
    timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("condition not reached")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_subscribe_input_and_global_events() -> Result<()> {
    init_tracing();
    let (url, log) = serve(None).await?;
    let socket = SessionSocket::new(config(&url), None)?;

    let output = Arc::new(Mutex::new(Vec::new()));
    let statuses = Arc::new(Mutex::new(Vec::new()));
    {
        let output = Arc::clone(&output);
        socket.on(
            "terminal_output",
            handler(move |v| output.lock().push(v["data"].clone())),
        );
        let statuses = Arc::clone(&statuses);
        socket.on(
            "agent_status_changed",
            handler(move |v| statuses.lock().push(v.clone())),
        );
    }

    let mut states = socket.controller().watch_state();
    socket.connect();
    wait_for(&mut states, ConnectionState::Connected).await?;
    assert!(socket.controller().link_id().is_some());

    assert!(socket.subscribe_to_session("s1"));
    wait_until(|| !socket.subscribed_sessions().is_empty()).await?;
    assert_eq!(socket.subscribed_sessions(), vec![SessionId::new("s1")]);

    // Confirmed: a second subscribe is not sent.
    assert!(!socket.subscribe_to_session("s1"));

    assert!(socket.send_input("s1", "echo hi\n"));
    wait_until(|| !statuses.lock().is_empty()).await?;

    assert_eq!(*output.lock(), vec![json!("echo hi\n")]);
    assert_eq!(statuses.lock()[0]["status"], "busy");
    assert_eq!(log.subscribes.load(Ordering::SeqCst), 1);

    socket.disconnect();
    wait_for(&mut states, ConnectionState::Disconnected).await?;
    assert!(socket.subscribed_sessions().is_empty());
    assert!(!socket.send_input("s1", "late"));

    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_server_drop_without_resubscribing() -> Result<()> {
    init_tracing();
    let (url, log) = serve(Some(1)).await?;
    let socket = SessionSocket::new(config(&url), None)?;

    let mut states = socket.controller().watch_state();
    socket.connect();
    wait_for(&mut states, ConnectionState::Connected).await?;
    let first = socket.controller().link_id();

    // Server closes right after the subscription.
    socket.subscribe_to_session("s1");
    wait_for(&mut states, ConnectionState::Reconnecting).await?;
    wait_for(&mut states, ConnectionState::Connected).await?;

    assert_ne!(socket.controller().link_id(), first);
    assert_eq!(log.connections.load(Ordering::SeqCst), 2);
    assert_eq!(socket.controller().attempts(), 0);

    // Previous subscriptions are remembered but not replayed.
    assert_eq!(socket.subscribed_sessions(), vec![SessionId::new("s1")]);
    assert_eq!(log.subscribes.load(Ordering::SeqCst), 1);

    socket.controller().destroy();
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_falls_back() -> Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    drop(listener);

    let socket = SessionSocket::new(config(&url).with_max_reconnect_attempts(2), None)?;
    let mut states = socket.controller().watch_state();
    socket.connect();

    wait_for(&mut states, ConnectionState::Fallback).await?;
    assert_eq!(socket.controller().attempts(), 2);
    assert!(!socket.subscribe_to_session("s1"));

    Ok(())
}
