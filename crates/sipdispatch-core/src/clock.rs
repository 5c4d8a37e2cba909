//! Monotonic clock abstraction
//!
//! The core consumes monotonic time but never owns it: deadline arithmetic
//! and receive timestamps go through this trait so hosts (and tests) can
//! inject their own source.

use tokio::time::Instant;

/// Supplier of strictly non-decreasing timestamps
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default clock backed by the runtime's monotonic time source.
///
/// `tokio::time::Instant` is immune to wall-clock adjustment and integrates
/// with the paused test clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
