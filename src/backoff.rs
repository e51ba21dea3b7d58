//! Exponential reconnection backoff with full jitter

use rand::Rng;
use std::time::Duration;

/// Reconnection delay policy
///
/// The computed delay for attempt `n` (1-based) is `base * 2^(n-1)`, capped at
/// `max`. The delay actually slept is that value scaled by a uniform random
/// factor in `[0, 1]`, so concurrent clients do not retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a policy; `max` is raised to `base` if it is smaller
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base) }
    }

    /// Starting delay
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound on any delay
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before jitter for the given attempt; attempt 0 is treated as 1.
    pub fn computed_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.checked_mul(1u32 << exponent).map_or(self.max, |delay| delay.min(self.max))
    }

    /// Jittered delay, uniformly drawn from `[0, computed_delay(attempt)]`
    pub fn jittered_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let factor: f64 = rng.random_range(0.0..=1.0);
        let computed = self.computed_delay(attempt);
        // f64 round-trip may overshoot by a nanosecond
        computed.mul_f64(factor).min(computed)
    }
}
