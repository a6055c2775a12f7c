//! Component-scoped owner of a controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ApiClient;
use crate::controller::Controller;
use crate::resource::{Resource, Snapshot};

// ============================================================================
// Mount
// ============================================================================

/// Ties a controller and its REST resources to one component's lifetime.
///
/// Creating a mount connects; [`unmount`](Self::unmount) (or drop) tears
/// everything down in order. Unmounting twice is a no-op.
#[derive(Debug)]
pub struct Mount {
    controller: Controller,
    requests: CancellationToken,
    unmounted: AtomicBool,
}

impl Mount {
    /// Mounts `controller` and starts connecting.
    #[must_use]
    pub fn new(controller: Controller) -> Self {
        let requests = controller.lifetime().child_token();
        controller.connect();

        Self {
            controller,
            requests,
            unmounted: AtomicBool::new(false),
        }
    }

    /// The mounted controller.
    #[inline]
    #[must_use]
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Token for REST calls that must be aborted on unmount.
    #[must_use]
    pub fn request_token(&self) -> CancellationToken {
        self.requests.child_token()
    }

    /// Creates a REST resource scoped to this mount.
    #[must_use]
    pub fn resource<T: Snapshot>(
        &self,
        api: Arc<dyn ApiClient>,
        path: impl Into<String>,
        initial: T,
        timeout: Duration,
    ) -> Resource<T> {
        Resource::new(
            api,
            path,
            initial,
            timeout,
            self.request_token(),
            Arc::clone(self.controller.liveness()),
        )
    }

    /// Returns `true` until unmounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        !self.unmounted.load(Ordering::SeqCst)
    }

    /// Tears down in order: mark unmounted, abort requests, then stop the
    /// controller (retry timer, poller, transport).
    pub fn unmount(&self) {
        if self.unmounted.swap(true, Ordering::SeqCst) {
            return;
        }

        self.controller.liveness().mark_unmounted();
        self.requests.cancel();
        self.controller.destroy();
        debug!("Unmounted");
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.unmount();
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
    use tokio::time::sleep;

    use crate::adapter::PushStreamAdapter;
    use crate::api::ApiResponse;
    use crate::config::SyncConfig;
    use crate::controller::ConnectionState;
    use crate::error::{Error, Result};
    use crate::resource::AgentStatus;
    use crate::transport::{Connector, Link};

    #[derive(Default)]
    struct Refusing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(&self) -> Result<Box<dyn Link>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::connection("refused"))
        }

        fn endpoint(&self) -> &str {
            "mock://refusing"
        }
    }

    struct Slow;

    #[async_trait]
    impl ApiClient for Slow {
        async fn get(&self, _path: &str) -> ApiResponse<Value> {
            sleep(Duration::from_secs(1)).await;
            ApiResponse::ok(json!({ "isActive": true }))
        }
    }

    fn mount(connector: &Arc<Refusing>) -> Mount {
        let controller = Controller::new(
            SyncConfig::new("http://localhost:3001/api/events"),
            Arc::clone(connector) as Arc<dyn Connector>,
            Arc::new(PushStreamAdapter::new()),
            None,
        )
        .expect("controller");
        Mount::new(controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_connects_and_unmount_stops_retries() {
        let connector = Arc::new(Refusing::default());
        let mount = mount(&connector);

        sleep(Duration::from_millis(10)).await;
        assert_eq!(mount.controller().state(), ConnectionState::Reconnecting);

        mount.unmount();
        sleep(Duration::from_secs(120)).await;

        assert!(!mount.is_mounted());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(mount.controller().state(), ConnectionState::Reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_aborts_resource_fetch() {
        let connector = Arc::new(Refusing::default());
        let mount = mount(&connector);
        let status = mount.resource(
            Arc::new(Slow),
            "/api/agent/status",
            AgentStatus::default(),
            Duration::from_secs(10),
        );

        let pending = tokio::spawn({
            let status = status.clone();
            async move { status.refresh().await }
        });
        sleep(Duration::from_millis(10)).await;

        mount.unmount();
        let err = pending.await.expect("join").unwrap_err();

        assert!(err.is_cancelled());
        assert!(!status.data().is_active);
        assert!(status.state().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_unmounts() {
        let connector = Arc::new(Refusing::default());
        let controller = {
            let mount = mount(&connector);
            mount.controller().clone()
        };

        assert!(!controller.liveness().is_live());
        assert!(controller.lifetime().is_cancelled());
    }
}
