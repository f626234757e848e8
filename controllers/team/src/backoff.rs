//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff mechanism for requeueing failed
//! reconciliations. The delay grows more slowly than exponential backoff, so a
//! Team stuck on a condition an operator has to fix (such as a roleRef
//! conflict) keeps being retried at a bounded cadence.
//!
//! With the default 5s minimum and 300s maximum the sequence is
//! 5s, 5s, 10s, 15s, 25s, 40s, 65s, 105s, 170s, 275s, 300s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two backoffs, capped at the
/// configured maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff value (for reset)
    min: Duration,
    /// Previous backoff value
    prev: Duration,
    /// Current backoff value
    current: Duration,
    /// Maximum backoff value
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given minimum and maximum.
    ///
    /// # Arguments
    ///
    /// * `min` - Delay used for the first two values
    /// * `max` - Cap on the sequence
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min.min(max),
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);

        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min.min(self.max);
    }
}
