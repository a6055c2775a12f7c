//! Lifetime tracking for UI-owned sync resources.
//!
//! A [`Mount`] ties a [`Controller`](crate::Controller) and any REST
//! [`Resource`](crate::Resource)s to the lifetime of one UI component.
//! [`Liveness`] is the flag every asynchronous callback checks before it
//! mutates anything.
//!
//! # Unmount Order
//!
//! 1. Mark the instance unmounted
//! 2. Abort in-flight REST requests
//! 3. Clear the pending backoff timer
//! 4. Clear the fallback poll interval
//! 5. Tear down the transport

// ============================================================================
// Submodules
// ============================================================================

/// Unmounted flag shared with async callbacks.
pub mod guard;

/// Component-scoped owner of a controller and its resources.
pub mod mount;

// ============================================================================
// Re-exports
// ============================================================================

pub use guard::Liveness;
pub use mount::Mount;
