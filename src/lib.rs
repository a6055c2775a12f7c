//! Live sync - keep client state in step with a server over push channels.
//!
//! This library keeps a UI synchronized with continuously changing
//! server-held state (agent status, terminal output, orchestration events)
//! without manual refresh.
//!
//! # Architecture
//!
//! Two delivery modes share one lifecycle:
//!
//! - **Push stream**: one-way Server-Sent Events from a single URL
//! - **Session socket**: bidirectional WebSocket with per-session
//!   subscriptions and input
//!
//! Key design principles:
//!
//! - Each [`Controller`] owns one transport and one driver task
//! - Failures retry with capped exponential backoff
//! - After too many consecutive failures, REST polling takes over until a
//!   manual [`Controller::reconnect`]
//! - Nothing mutates state after its owner unmounts
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use live_sync::{Controller, HttpApiClient, Mount, Result, SyncConfig, handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SyncConfig::new("http://localhost:3001/api/events");
//!     let api = HttpApiClient::new("http://localhost:3001", config.request_timeout)?;
//!     let controller = Controller::push_stream(config, Some(Arc::new(api)))?;
//!
//!     controller.on("status_update", handler(|status| println!("{status}")));
//!
//!     // Connects now, tears down on drop.
//!     let mount = Mount::new(controller);
//!     tokio::signal::ctrl_c().await.ok();
//!     mount.unmount();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Push-stream and session-socket adapters |
//! | [`api`] | REST collaborator interface and HTTP client |
//! | [`backoff`] | Retry delay policy |
//! | [`config`] | [`SyncConfig`] |
//! | [`controller`] | Connection state machine |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`lifecycle`] | Unmount guard and [`Mount`] |
//! | [`poller`] | Fallback REST polling |
//! | [`protocol`] | Wire message types |
//! | [`registry`] | Event name to handler fan-out |
//! | [`resource`] | REST resources with safe defaults |
//! | [`transport`] | SSE and WebSocket connectors |

// ============================================================================
// Modules
// ============================================================================

/// Transport adapters.
///
/// - [`PushStreamAdapter`] - one-way push stream
/// - [`SessionSocket`] - bidirectional session socket
pub mod adapter;

/// REST collaborator.
pub mod api;

/// Retry delay policy.
pub mod backoff;

/// Connection and polling configuration.
pub mod config;

/// Connection lifecycle controller.
///
/// Use [`Controller::push_stream`] or [`SessionSocket::new`] to create one.
pub mod controller;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Mount guard and ordered teardown.
pub mod lifecycle;

/// Fallback REST polling.
pub mod poller;

/// Wire message types.
pub mod protocol;

/// Event subscription registry.
pub mod registry;

/// REST resources with safe defaults.
pub mod resource;

/// Transport layer.
///
/// Explicit connector and link interfaces with SSE and WebSocket
/// implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Adapter types
pub use adapter::{Adapter, PushStreamAdapter, SessionSocket, SessionSocketAdapter};

// REST types
pub use api::{ApiClient, ApiResponse, HttpApiClient};

// Backoff types
pub use backoff::BackoffPolicy;

// Configuration types
pub use config::{BackoffProfile, SyncConfig};

// Controller types
pub use controller::{ConnectionState, Controller};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{LinkId, SessionId};

// Lifecycle types
pub use lifecycle::{Liveness, Mount};

// Protocol types
pub use protocol::{MessageEnvelope, SocketCommand, SocketEvent};

// Registry types
pub use registry::{EventHandler, EventRegistry, handler};

// Resource types
pub use resource::{AgentStatus, Resource, ResourceState, Snapshot};
