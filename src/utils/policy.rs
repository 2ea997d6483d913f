//! Bounded retry and polling policies.

use std::time::Duration;

/// Retry with a linearly growing delay: the delay after the `i`-th failed
/// attempt (zero-indexed) is `base + i * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub step: Duration,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base: Duration, step: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            base,
            step,
        }
    }

    /// Delay to wait after the failed attempt with index `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base + self.step * retry
    }

    /// The delays between consecutive attempts, in order. There is one delay
    /// less than there are attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(move |retry| self.delay(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::linear(10, Duration::from_secs(1), Duration::from_secs(1))
    }
}

/// Poll a condition a fixed number of times with a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_delays_grow_by_a_second() {
        let delays: Vec<u64> = RetryPolicy::default().delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn single_attempt_has_no_delay() {
        let policy = RetryPolicy::linear(1, Duration::from_millis(5), Duration::from_millis(5));
        assert_eq!(policy.delays().count(), 0);
    }
}
