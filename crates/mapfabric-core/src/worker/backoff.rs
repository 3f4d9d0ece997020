//! Exponential backoff for transient broker errors

use std::time::Duration;

/// Stateful exponential backoff: starts at `initial_delay`, doubles per
/// failed attempt, saturates at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial delay
    pub initial_delay: Duration,

    /// Maximum delay
    pub max_delay: Duration,

    /// Multiplier applied per attempt
    pub multiplier: f64,

    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let factor = self.multiplier.powi(self.attempt as i32);
        self.attempt = self.attempt.saturating_add(1);
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }

    /// Reset after a successful attempt
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(10), Duration::from_millis(5120))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_from_initial_delay() {
        let mut backoff = ExponentialBackoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20));
        assert_eq!(backoff.next_delay(), Duration::from_millis(40));
        assert_eq!(backoff.next_delay(), Duration::from_millis(80));
    }

    #[test]
    fn test_saturates_at_max_delay() {
        let mut backoff = ExponentialBackoff::default();
        for _ in 0..32 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(5120));
    }

    #[test]
    fn test_reset() {
        let mut backoff = ExponentialBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }
}
