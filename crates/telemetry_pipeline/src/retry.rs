//! Retry policy: exponential backoff with a cap and additive jitter.
//!
//! The backoff computation is a pure function of the attempt number; the
//! jitter source is injected so tests can run with deterministic delays.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of randomness for backoff jitter.
pub trait JitterSource: Send {
    /// Returns a duration uniformly drawn from `[0, max)`. Zero when `max`
    /// is zero.
    fn jitter(&mut self, max: Duration) -> Duration;
}

/// Default jitter source backed by a small PRNG.
#[derive(Debug)]
pub struct RandomJitter {
    rng: SmallRng,
}

impl RandomJitter {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Seeded construction for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterSource for RandomJitter {
    fn jitter(&mut self, max: Duration) -> Duration {
        let max_nanos = max.as_nanos() as u64;
        if max_nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.gen_range(0..max_nanos))
    }
}

/// Jitter source that never adds jitter. Intended for tests.
#[derive(Debug, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn jitter(&mut self, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

/// Decides whether and when a failed export attempt is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of `export` calls per batch.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential growth.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// True while another export call is allowed. `attempt` counts the
    /// export calls already made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Backoff delay before retry number `attempt` (0-indexed), without
    /// jitter: `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Capped backoff delay plus jitter in `[0, delay / 5)`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: &mut dyn JitterSource) -> Duration {
        let delay = self.delay_for(attempt);
        delay + jitter.jitter(delay / 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_bounded_by_max_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(100));
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        // Capped from here on.
        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for(30), Duration::from_secs(1));
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::default();
        let mut jitter = RandomJitter::seeded(7);
        for attempt in 0..8 {
            let base = policy.delay_for(attempt);
            let with_jitter = policy.delay_with_jitter(attempt, &mut jitter);
            assert!(with_jitter >= base);
            assert!(with_jitter < base + base / 5 + Duration::from_nanos(1));
        }
    }

    #[test]
    fn test_no_jitter_is_deterministic() {
        let policy = RetryPolicy::default();
        let mut jitter = NoJitter;
        assert_eq!(
            policy.delay_with_jitter(1, &mut jitter),
            policy.delay_for(1)
        );
    }
}
