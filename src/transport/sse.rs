//! Server-Sent Events transport.
//!
//! Wraps [`reqwest_eventsource`] with its built-in retry disabled: retry
//! timing belongs to the controller, so a failed stream simply ends.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Event as SseEvent, EventSource, retry::Never};
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::{Connector, Frame, Link};

// ============================================================================
// Constants
// ============================================================================

/// Event name the SSE format assigns when the server sends none.
const DEFAULT_EVENT: &str = "message";

// ============================================================================
// SseConnector
// ============================================================================

/// [`Connector`] for a one-way event stream addressed by one URL.
#[derive(Debug, Clone)]
pub struct SseConnector {
    url: Url,
    http: reqwest::Client,
    open_timeout: Duration,
}

impl SseConnector {
    /// Creates a connector for `url`.
    ///
    /// The HTTP client gets a connect timeout only; a total request
    /// timeout would cut the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(url: Url, open_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(open_timeout)
            .build()?;
        Ok(Self {
            url,
            http,
            open_timeout,
        })
    }
}

#[async_trait]
impl Connector for SseConnector {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        let request = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream");

        let mut source =
            EventSource::new(request).map_err(|e| Error::connection(e.to_string()))?;
        source.set_retry_policy(Box::new(Never));

        debug!(url = %self.url, "Opening event stream");

        let first = match timeout(self.open_timeout, source.next()).await {
            Ok(first) => first,
            Err(_) => {
                source.close();
                return Err(Error::connection_timeout(self.open_timeout.as_millis() as u64));
            }
        };

        let pending = match first {
            Some(Ok(SseEvent::Open)) => None,
            Some(Ok(SseEvent::Message(message))) => Some(Frame::Event {
                event: message.event,
                data: message.data,
            }),
            Some(Err(e)) => {
                source.close();
                return Err(Error::connection(e.to_string()));
            }
            None => return Err(Error::ConnectionClosed),
        };

        Ok(Box::new(SseLink { source, pending }))
    }

    fn endpoint(&self) -> &str {
        self.url.as_str()
    }
}

// ============================================================================
// SseLink
// ============================================================================

/// An open event stream.
struct SseLink {
    source: EventSource,
    /// Message that arrived before the open notification.
    pending: Option<Frame>,
}

#[async_trait]
impl Link for SseLink {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Some(Ok(frame));
        }

        loop {
            match self.source.next().await? {
                Ok(SseEvent::Open) => trace!("Event stream re-opened"),
                Ok(SseEvent::Message(message)) => {
                    let event = if message.event.is_empty() {
                        DEFAULT_EVENT.to_string()
                    } else {
                        message.event
                    };
                    return Some(Ok(Frame::Event {
                        event,
                        data: message.data,
                    }));
                }
                Err(reqwest_eventsource::Error::StreamEnded) => return None,
                Err(e) => return Some(Err(Error::connection(e.to_string()))),
            }
        }
    }

    async fn send(&mut self, _text: String) -> Result<()> {
        Err(Error::protocol("push stream is receive-only"))
    }

    async fn close(&mut self) {
        self.source.close();
    }
}
