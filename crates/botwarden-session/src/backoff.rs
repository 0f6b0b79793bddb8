//! Reconnection delay policy.
//!
//! Each consecutive unexpected drop waits twice as long as the previous
//! one, capped; a successful spawn resets the sequence to the floor.

use std::time::Duration;

/// Doubling backoff with a floor and a cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `floor`. A cap below the floor is raised to it.
    #[must_use]
    pub fn new(floor: Duration, cap: Duration) -> Self {
        let cap = cap.max(floor);
        Self {
            floor,
            cap,
            current: floor,
        }
    }

    /// Delay to use for the next reconnect, without advancing.
    #[must_use]
    pub const fn peek(&self) -> Duration {
        self.current
    }

    /// Take the delay for this drop and double it for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        delay
    }

    /// Back to the floor after a successful session.
    pub const fn reset(&mut self) {
        self.current = self.floor;
    }

    /// Delay after a reset.
    #[must_use]
    pub const fn floor(&self) -> Duration {
        self.floor
    }

    /// Longest delay ever returned.
    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_doubling_then_cap() {
        let mut backoff = Backoff::new(secs(5), secs(60));
        let seq: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(seq, vec![5, 10, 20, 40, 60, 60, 60]);
    }

    #[test]
    fn test_ten_second_floor_variant() {
        let mut backoff = Backoff::new(secs(10), secs(60));
        let seq: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(seq, vec![10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_reset_returns_to_floor() {
        let mut backoff = Backoff::new(secs(5), secs(60));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), secs(20));

        backoff.reset();
        assert_eq!(backoff.next_delay(), secs(5));
        assert_eq!(backoff.peek(), secs(10));
    }

    #[test]
    fn test_cap_below_floor() {
        let mut backoff = Backoff::new(secs(5), secs(1));
        assert_eq!(backoff.cap(), secs(5));
        assert_eq!(backoff.next_delay(), secs(5));
        assert_eq!(backoff.next_delay(), secs(5));
    }
}
