//! Fallback poller.
//!
//! While the push transport is unusable, the poller re-fetches the full
//! state over REST on a fixed interval and dispatches it into the registry
//! under the snapshot event, so subscribers keep receiving data.
//!
//! - The first poll happens immediately on activation.
//! - Every tick is independent: a failed poll records a soft error and the
//!   next tick still runs.
//! - Polls may overlap when a request outlives the interval; a poll that
//!   finishes after a newer one has settled is discarded.
//! - Deactivation (stop or drop) cancels in-flight polls; a poll that
//!   completes afterwards changes nothing.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, fetch};
use crate::lifecycle::Liveness;
use crate::registry::EventRegistry;

// ============================================================================
// Types
// ============================================================================

/// Soft error slot shared between the poller and its owner.
pub type ErrorSlot = Arc<Mutex<Option<String>>>;

/// Everything a poll needs, cheap to clone into a task.
#[derive(Clone)]
pub struct PollTarget {
    /// REST client.
    pub api: Arc<dyn ApiClient>,
    /// Snapshot path.
    pub path: String,
    /// Registry event receiving the snapshot.
    pub event: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Registry to dispatch into.
    pub registry: Arc<EventRegistry>,
    /// Owner's unmounted flag.
    pub live: Arc<Liveness>,
    /// Where poll failures are reported.
    pub last_error: ErrorSlot,
}

// ============================================================================
// FallbackPoller
// ============================================================================

/// Periodic REST re-fetch, active between construction and drop.
pub struct FallbackPoller {
    target: PollTarget,
    interval: Interval,
    cancel: CancellationToken,
    polls: Arc<AtomicU64>,
    /// Highest poll number that has settled.
    settled: Arc<AtomicU64>,
}

impl FallbackPoller {
    /// Activates polling every `period`.
    ///
    /// `cancel` should be a child of the owner's lifetime token so that
    /// unmount aborts in-flight polls too.
    #[must_use]
    pub fn start(target: PollTarget, period: Duration, cancel: CancellationToken) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %target.path,
            period_ms = period.as_millis() as u64,
            "Fallback polling started"
        );

        Self {
            target,
            interval,
            cancel,
            polls: Arc::new(AtomicU64::new(0)),
            settled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Waits for the next tick. The first tick completes immediately.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Spawns one poll.
    pub fn poll(&self) {
        let n = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        let target = self.target.clone();
        let cancel = self.cancel.clone();
        let settled = Arc::clone(&self.settled);
        tokio::spawn(poll_once(target, cancel, settled, n));
    }

    /// Number of polls issued so far.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Stops polling and cancels any poll in flight.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
        debug!(polls = self.poll_count(), "Fallback polling stopped");
    }
}

/// Performs one fetch and publishes the outcome unless deactivated.
async fn poll_once(
    target: PollTarget,
    cancel: CancellationToken,
    settled: Arc<AtomicU64>,
    n: u64,
) {
    let result = fetch(target.api.as_ref(), &target.path, &cancel, target.timeout).await;

    let active = || !cancel.is_cancelled() && target.live.is_live();
    if !active() {
        debug!(poll = n, "Poll finished after deactivation, discarded");
        return;
    }

    if settled.fetch_max(n, Ordering::SeqCst) > n {
        debug!(poll = n, "Poll overtaken by a newer one, discarded");
        return;
    }

    match result {
        Ok(snapshot) => {
            debug!(poll = n, "Fallback poll succeeded");
            *target.last_error.lock() = None;
            target.registry.dispatch_while(&target.event, &snapshot, active);
        }
        Err(e) if e.is_cancelled() => debug!(poll = n, "Fallback poll cancelled"),
        Err(e) => {
            warn!(poll = n, error = %e, "Fallback poll failed");
            *target.last_error.lock() = Some(e.to_string());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::api::ApiResponse;
    use crate::registry::handler;

    /// Fails every other call, starting with a success.
    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ApiClient for Flaky {
        async fn get(&self, _path: &str) -> ApiResponse<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                ApiResponse::ok(json!({ "poll": n }))
            } else {
                ApiResponse::err("Network error")
            }
        }
    }

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl ApiClient for Hanging {
        async fn get(&self, _path: &str) -> ApiResponse<Value> {
            std::future::pending().await
        }
    }

    /// First call answers after 8s, later calls at once.
    struct Staggered {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ApiClient for Staggered {
        async fn get(&self, _path: &str) -> ApiResponse<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(8)).await;
            }
            ApiResponse::ok(json!({ "poll": n }))
        }
    }

    fn target(api: Arc<dyn ApiClient>) -> (PollTarget, Arc<Mutex<Vec<Value>>>) {
        let registry = Arc::new(EventRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.on("status_update", handler(move |v| sink.lock().push(v.clone())));

        let target = PollTarget {
            api,
            path: "/api/status".into(),
            event: "status_update".into(),
            timeout: Duration::from_secs(5),
            registry,
            live: Arc::new(Liveness::new()),
            last_error: Arc::new(Mutex::new(None)),
        };
        (target, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate_and_failures_do_not_stop_polling() {
        let api = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
        });
        let (target, seen) = target(api.clone());
        let last_error = Arc::clone(&target.last_error);
        let mut poller =
            FallbackPoller::start(target, Duration::from_secs(10), CancellationToken::new());

        // Tick 1 (immediate): success.
        poller.tick().await;
        poller.poll();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(seen.lock().len(), 1);
        assert!(last_error.lock().is_none());

        // Tick 2: failure is recorded, nothing dispatched.
        poller.tick().await;
        poller.poll();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(last_error.lock().as_deref(), Some("Network error"));

        // Tick 3: polling continued; success clears the error.
        poller.tick().await;
        poller.poll();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(seen.lock().len(), 2);
        assert!(last_error.lock().is_none());
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert_eq!(poller.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_in_flight_poll_without_error() {
        let (target, seen) = target(Arc::new(Hanging));
        let last_error = Arc::clone(&target.last_error);
        let mut poller =
            FallbackPoller::start(target, Duration::from_secs(10), CancellationToken::new());

        poller.tick().await;
        poller.poll();
        tokio::time::sleep(Duration::from_millis(1)).await;

        poller.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(seen.lock().is_empty());
        assert!(last_error.lock().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overtaken_poll_is_discarded() {
        let api = Arc::new(Staggered {
            calls: AtomicUsize::new(0),
        });
        let (mut target, seen) = target(api.clone());
        target.timeout = Duration::from_secs(10);
        let mut poller =
            FallbackPoller::start(target, Duration::from_secs(5), CancellationToken::new());

        // Poll 1 hangs for 8s; poll 2 at 5s answers at once.
        poller.tick().await;
        poller.poll();
        poller.tick().await;
        poller.poll();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*seen.lock(), vec![json!({ "poll": 1 })]);

        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*seen.lock(), vec![json!({ "poll": 1 })]);
    }
}
