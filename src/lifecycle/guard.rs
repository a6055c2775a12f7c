//! Unmounted flag.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

// ============================================================================
// Liveness
// ============================================================================

/// One-way flag flipped when the owning component goes away.
///
/// Once [`mark_unmounted`](Self::mark_unmounted) has run,
/// [`is_live`](Self::is_live) returns `false` forever.
#[derive(Debug)]
pub struct Liveness {
    unmounted: AtomicBool,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Creates a live flag.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            unmounted: AtomicBool::new(false),
        }
    }

    /// Returns `true` until the owner is unmounted.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.unmounted.load(Ordering::Acquire)
    }

    /// Marks the owner unmounted.
    ///
    /// Returns `true` on the first call, `false` if already unmounted.
    pub fn mark_unmounted(&self) -> bool {
        let first = !self.unmounted.swap(true, Ordering::AcqRel);
        if first {
            debug!("Marked unmounted");
        }
        first
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_is_one_way() {
        let live = Liveness::new();
        assert!(live.is_live());
        assert!(live.mark_unmounted());
        assert!(!live.is_live());
        assert!(!live.mark_unmounted());
        assert!(!live.is_live());
    }
}
