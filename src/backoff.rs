//! Reconnect delay calculation.
//!
//! A [`BackoffPolicy`] maps a zero-based attempt count to the wait before
//! the next connection attempt:
//!
//! ```text
//! delay = min(base * growth^attempt + jitter, max)    jitter in [0, jitter_max)
//! ```
//!
//! Two profiles are provided:
//!
//! | Profile | Growth | Jitter | Used by |
//! |---------|--------|--------|---------|
//! | [`BackoffPolicy::doubling`] | 2.0 | none | push-stream transport |
//! | [`BackoffPolicy::smooth`] | 1.5 | up to `base` | session socket transport |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

// ============================================================================
// Constants
// ============================================================================

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound for any retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponent clamp; far beyond the point where every profile hits the cap.
const MAX_EXPONENT: u32 = 64;

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay at attempt 0.
    pub base: Duration,
    /// Cap applied after growth and jitter.
    pub max: Duration,
    /// Multiplier per attempt.
    pub growth: f64,
    /// Exclusive upper bound of the random addition, `None` for no jitter.
    pub jitter_max: Option<Duration>,
}

impl BackoffPolicy {
    /// Predictable capped doubling: 1s, 2s, 4s, ... up to `max`.
    #[must_use]
    pub const fn doubling(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            growth: 2.0,
            jitter_max: None,
        }
    }

    /// Smoother 1.5x growth with jitter up to one base delay.
    #[must_use]
    pub const fn smooth(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            growth: 1.5,
            jitter_max: Some(base),
        }
    }

    /// Returns the wait before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = match self.jitter_max {
            Some(bound) if !bound.is_zero() => {
                rand::thread_rng().gen_range(0.0..bound.as_secs_f64() * 1000.0)
            }
            _ => 0.0,
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Deterministic core of [`delay`](Self::delay) with a fixed jitter in ms.
    fn delay_with_jitter(&self, attempt: u32, jitter_ms: f64) -> Duration {
        let base_ms = self.base.as_secs_f64() * 1000.0;
        let max_ms = self.max.as_secs_f64() * 1000.0;
        let grown = base_ms * self.growth.max(1.0).powi(attempt.min(MAX_EXPONENT) as i32);

        let ms = (grown + jitter_ms.max(0.0)).min(max_ms);
        if ms.is_nan() || ms <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_millis(ms as u64)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::doubling(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_doubling_sequence() {
        let policy = BackoffPolicy::default();
        let ms: Vec<u128> = (0..7).map(|a| policy.delay(a).as_millis()).collect();
        assert_eq!(ms, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_attempt_zero_is_base() {
        let policy = BackoffPolicy::doubling(Duration::from_millis(250), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay(0), Duration::from_millis(250));
    }

    #[test]
    fn test_smooth_attempt_zero_within_jitter() {
        let policy = BackoffPolicy::smooth(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY);
        for _ in 0..100 {
            let d = policy.delay(0);
            assert!(d >= DEFAULT_BASE_DELAY);
            assert!(d < DEFAULT_BASE_DELAY * 2);
        }
    }

    #[test]
    fn test_smooth_growth_without_jitter() {
        let policy = BackoffPolicy::smooth(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_with_jitter(1, 0.0), Duration::from_millis(1500));
        assert_eq!(policy.delay_with_jitter(2, 0.0), Duration::from_millis(2250));
    }

    #[test]
    fn test_huge_attempt_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(u32::MAX), DEFAULT_MAX_DELAY);
    }

    proptest! {
        #[test]
        fn prop_delay_is_bounded(attempt in 0u32..10_000, smooth in any::<bool>()) {
            let policy = if smooth {
                BackoffPolicy::smooth(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
            } else {
                BackoffPolicy::default()
            };
            let d = policy.delay(attempt);
            prop_assert!(d <= DEFAULT_MAX_DELAY);
        }

        #[test]
        fn prop_delay_non_decreasing(attempt in 0u32..200, base_ms in 1u64..5_000) {
            let policy = BackoffPolicy::doubling(Duration::from_millis(base_ms), DEFAULT_MAX_DELAY);
            prop_assert!(policy.delay(attempt) <= policy.delay(attempt + 1));
        }
    }
}
