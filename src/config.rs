//! Connection and polling configuration.
//!
//! Every setting is optional and has a default. Configure in code with the
//! `with_*` builder methods or load from JSON (durations are milliseconds):
//!
//! ```ignore
//! use live_sync::SyncConfig;
//!
//! let config = SyncConfig::new("http://localhost:3001/api/events")
//!     .with_max_reconnect_attempts(3)
//!     .with_poll_interval(std::time::Duration::from_secs(10));
//!
//! let from_json: SyncConfig = serde_json::from_str(
//!     r#"{ "endpoint": "ws://localhost:3001/ws", "poll_interval_ms": 5000 }"#,
//! )?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::backoff::{BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use crate::error::{Error, Result};
use crate::protocol::names;

// ============================================================================
// Constants
// ============================================================================

/// Default number of consecutive failures before falling back to polling.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default interval between fallback polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-request REST timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default REST path returning the full aggregate state.
pub const DEFAULT_SNAPSHOT_PATH: &str = "/api/status";

// ============================================================================
// BackoffProfile
// ============================================================================

/// Which growth curve the controller uses between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffProfile {
    /// Capped doubling without jitter.
    #[default]
    Doubling,
    /// 1.5x growth with jitter.
    Smooth,
}

// ============================================================================
// SyncConfig
// ============================================================================

/// Live sync configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Push endpoint (`http(s)://` for SSE, `ws(s)://` for the socket).
    pub endpoint: String,

    /// REST path fetched by the fallback poller, relative to the API base.
    pub snapshot_path: String,

    /// Registry event that receives pushed and polled snapshots.
    pub snapshot_event: String,

    /// Consecutive failures before entering fallback.
    pub max_reconnect_attempts: u32,

    /// Delay before the first retry.
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,

    /// Upper bound for any retry delay.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,

    /// Growth curve between retries, `None` for the transport's default.
    pub backoff: Option<BackoffProfile>,

    /// Interval between fallback polls.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Per-request REST timeout.
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            snapshot_path: DEFAULT_SNAPSHOT_PATH.to_string(),
            snapshot_event: names::STATUS_UPDATE.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SyncConfig {
    /// Creates a configuration for `endpoint` with defaults elsewhere.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SyncConfig {
    /// Sets the REST snapshot path.
    #[inline]
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<String>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// Sets the registry event that receives snapshots.
    #[inline]
    #[must_use]
    pub fn with_snapshot_event(mut self, event: impl Into<String>) -> Self {
        self.snapshot_event = event.into();
        self
    }

    /// Sets the number of failures tolerated before fallback.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the first retry delay.
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the retry delay cap.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff growth curve.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, profile: BackoffProfile) -> Self {
        self.backoff = Some(profile);
        self
    }

    /// Sets the fallback poll interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the REST request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl SyncConfig {
    /// Returns the backoff policy, using `default` when no profile is set.
    #[must_use]
    pub fn backoff_policy(&self, default: BackoffProfile) -> BackoffPolicy {
        match self.backoff.unwrap_or(default) {
            BackoffProfile::Doubling => BackoffPolicy::doubling(self.base_delay, self.max_delay),
            BackoffProfile::Smooth => BackoffPolicy::smooth(self.base_delay, self.max_delay),
        }
    }

    /// Parses and returns the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is empty, or
    /// [`Error::Url`] if it does not parse.
    pub fn endpoint_url(&self) -> Result<Url> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::config(
                "endpoint is required. Use SyncConfig::new(\"http://host/events\")",
            ));
        }
        Ok(Url::parse(&self.endpoint)?)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is missing, attempts is zero,
    ///   the poll interval or request timeout is zero, or
    ///   `base_delay > max_delay`
    /// - [`Error::Url`] if the endpoint does not parse
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;

        if self.max_reconnect_attempts == 0 {
            return Err(Error::config("max_reconnect_attempts must be at least 1"));
        }

        if self.base_delay > self.max_delay {
            return Err(Error::config(format!(
                "base_delay ({}ms) exceeds max_delay ({}ms)",
                self.base_delay.as_millis(),
                self.max_delay.as_millis()
            )));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::config("poll_interval must be non-zero"));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be non-zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// `Duration` as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
