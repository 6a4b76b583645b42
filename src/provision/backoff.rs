//! # Fibonacci Backoff
//!
//! Progressive backoff for provisioning retries and stack polling. Grows more
//! slowly than exponential backoff, so a resource that needs several attempts
//! does not end up waiting minutes between them.
//!
//! Sequence for a 1s start and 30s cap: 1s, 1s, 2s, 3s, 5s, 8s, 13s, 21s, 30s (max).
//!
//! ## Usage
//!
//! ```rust
//! use connection_pooling::provision::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max`. Calculations
/// are done in whole milliseconds.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev_ms: u64,
    current_ms: u64,
    max_ms: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min` and capped at `max`
    ///
    /// A `max` below `min` is raised to `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_ms = duration_ms(min).max(1);
        let max_ms = duration_ms(max).max(min_ms);
        Self {
            prev_ms: 0,
            current_ms: min_ms,
            max_ms,
        }
    }

    /// Get the next delay in milliseconds and advance the sequence
    pub fn next_backoff_ms(&mut self) -> u64 {
        let result = self.current_ms;
        let next = self.prev_ms.saturating_add(self.current_ms);
        self.prev_ms = self.current_ms;
        self.current_ms = next.min(self.max_ms);
        result
    }

    /// Get the next delay as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_millis(self.next_backoff_ms())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(secs(1), secs(30));

        // 1s, 1s, 2s, 3s, 5s, 8s, 13s, 21s, 30s (max)
        let expected = [1, 1, 2, 3, 5, 8, 13, 21, 30, 30];
        for want in expected {
            assert_eq!(backoff.next_backoff(), secs(want));
        }
    }

    #[test]
    fn test_fibonacci_backoff_max_below_min() {
        let mut backoff = FibonacciBackoff::new(secs(5), secs(1));
        assert_eq!(backoff.next_backoff(), secs(5));
        assert_eq!(backoff.next_backoff(), secs(5));
    }

    #[test]
    fn test_fibonacci_backoff_independent_state() {
        let mut first = FibonacciBackoff::new(Duration::from_millis(10), Duration::from_millis(100));
        let mut second = first.clone();

        assert_eq!(first.next_backoff_ms(), 10);
        assert_eq!(first.next_backoff_ms(), 10);
        assert_eq!(first.next_backoff_ms(), 20);

        assert_eq!(second.next_backoff_ms(), 10);
    }
}
