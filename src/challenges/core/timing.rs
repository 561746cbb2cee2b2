//! Start spacing for challenge attempts.
//!
//! The state is passive: the admission gate owns the lock and
//! decides when to sleep, this type only does the arithmetic.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Tracks the last attempt start and the minimum spacing between starts.
#[derive(Debug, Clone)]
pub struct RateLimiterState {
    last_start: Option<Instant>,
    interval: Duration,
    jitter_min: Duration,
    jitter_max: Duration,
}

impl RateLimiterState {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_start: None,
            interval,
            jitter_min: Duration::from_millis(100),
            jitter_max: Duration::from_millis(500),
        }
    }

    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min;
        self.jitter_max = if max < min { min } else { max };
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_start(&self) -> Option<Instant> {
        self.last_start
    }

    /// How long a caller must wait at `now` before starting.
    ///
    /// `None` when the interval has already elapsed; otherwise the remainder
    /// plus a random jitter so that waiting callers do not wake in lockstep.
    pub fn wait_before_start(&self, now: Instant) -> Option<Duration> {
        let last = self.last_start?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.interval {
            return None;
        }
        Some(self.interval - elapsed + self.jitter())
    }

    pub fn record_start(&mut self, at: Instant) {
        self.last_start = Some(at);
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        let mut rng = rand::thread_rng();
        let secs = rng.gen_range(self.jitter_min.as_secs_f64()..self.jitter_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_never_waits() {
        let state = RateLimiterState::new(Duration::from_secs(1));
        assert_eq!(state.wait_before_start(Instant::now()), None);
    }

    #[test]
    fn waits_for_remainder_plus_jitter() {
        let mut state = RateLimiterState::new(Duration::from_secs(1))
            .with_jitter(Duration::from_millis(50), Duration::from_millis(60));
        let start = Instant::now();
        state.record_start(start);

        let wait = state
            .wait_before_start(start + Duration::from_millis(400))
            .expect("inside the interval");
        assert!(wait >= Duration::from_millis(650));
        assert!(wait < Duration::from_millis(660));

        assert_eq!(state.wait_before_start(start + Duration::from_secs(1)), None);
    }
}
