//! Reconnect backoff
//!
//! Exponentially growing delay between reconnection attempts, doubling on
//! each consecutive failure up to a cap and reset to the base after a
//! successful pass. Jitter is added by the caller so the schedule itself
//! stays deterministic and testable.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Backoff
// ----------------------------------------------------------------------------

/// Deterministic exponential backoff schedule
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a schedule starting at `base` and capped at `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// The delay to sleep before the next attempt; doubles for the one after
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Reset to the base delay after a successful attempt
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// The delay the next call to `next_delay` would return
    pub fn peek(&self) -> Duration {
        self.current.min(self.max)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_failures_grow_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(10));

        let delays: Vec<Duration> = (0..7).map(|_| backoff.next_delay()).collect();

        // Non-decreasing throughout.
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(delays[0], Duration::from_millis(500));
        assert_eq!(delays[1], Duration::from_secs(1));
        assert_eq!(delays[2], Duration::from_secs(2));
        // Capped at the maximum.
        assert_eq!(delays[6], Duration::from_secs(10));
    }

    #[test]
    fn success_resets_to_the_base() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(10));
        backoff.next_delay();
        backoff.next_delay();
        assert!(backoff.peek() > Duration::from_millis(500));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }
}
