//! Global request token bucket
//!
//! Refills continuously at `rate` tokens per second up to `capacity`. Starts
//! full, so a burst of `capacity` requests is admitted immediately.

use std::sync::Mutex;
use std::time::Instant;

struct BucketState {
    tokens: f64,
    last: Instant,
}

pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    pub fn new(tokens_per_second: u32, capacity: u32) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last: Instant::now(),
            }),
            rate: tokens_per_second as f64,
            capacity: capacity as f64,
        }
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_exhausted() {
        let bucket = TokenBucket::new(10, 3);
        let now = Instant::now();
        assert!(bucket.try_acquire_at(now));
        assert!(bucket.try_acquire_at(now));
        assert!(bucket.try_acquire_at(now));
        assert!(!bucket.try_acquire_at(now));
    }

    #[test]
    fn test_refill_is_capped() {
        let bucket = TokenBucket::new(10, 2);
        let start = Instant::now();
        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));

        // 150ms at 10/s buys one and a half tokens
        let later = start + Duration::from_millis(150);
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(later));

        // A long pause refills only up to capacity
        let much_later = later + Duration::from_secs(60);
        assert!(bucket.try_acquire_at(much_later));
        assert!(bucket.try_acquire_at(much_later));
        assert!(!bucket.try_acquire_at(much_later));
    }
}
