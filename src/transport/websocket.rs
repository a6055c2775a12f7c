//! WebSocket transport.
//!
//! Client side of the session socket. Every text message is one
//! `{event, data}` frame; ping/pong is answered by tungstenite and binary
//! messages are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace};
use url::Url;

use crate::error::{Error, Result};

use super::{Connector, Frame, Link};

// ============================================================================
// WsConnector
// ============================================================================

/// [`Connector`] for a bidirectional WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    handshake_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector for a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for any other scheme.
    pub fn new(url: Url, handshake_timeout: Duration) -> Result<Self> {
        match url.scheme() {
            "ws" | "wss" => Ok(Self {
                url,
                handshake_timeout,
            }),
            other => Err(Error::config(format!(
                "WebSocket endpoint must use ws:// or wss://, got {other}://"
            ))),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        debug!(url = %self.url, "Opening WebSocket");

        let (stream, _response) = timeout(self.handshake_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(self.handshake_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        Ok(Box::new(WsLink {
            stream,
            closed: false,
        }))
    }

    fn endpoint(&self) -> &str {
        self.url.as_str()
    }
}

// ============================================================================
// WsLink
// ============================================================================

/// An open WebSocket.
struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Link for WsLink {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(Frame::Text(text.to_string()))),

                Some(Ok(Message::Close(_))) => {
                    debug!("WebSocket closed by remote");
                    return None;
                }

                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    return Some(Err(e.into()));
                }

                None => {
                    debug!("WebSocket stream ended");
                    return None;
                }

                // Ignore Binary, Ping, Pong, Frame
                Some(Ok(_)) => trace!("Ignoring non-text message"),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.stream.close(None).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
