//! Process-wide token bucket guarding the gist importer.

use std::sync::{Mutex, PoisonError};

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{PlaygroundError, Result};

/// Token bucket allowing `rate` acquisitions per second with bursts of `burst`.
///
/// Tokens are stored scaled by 1000 so refill can be computed from elapsed
/// milliseconds without floating point.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
    rate: u64,
    burst: u64,
}

#[derive(Debug)]
struct RateLimiterState {
    tokens: u64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a full bucket.
    pub fn new(rate: u64, burst: u64) -> Self {
        Self {
            state: Mutex::new(RateLimiterState {
                tokens: burst * 1000,
                last_refill: Instant::now(),
            }),
            rate,
            burst,
        }
    }

    /// Take one token, or fail with [`PlaygroundError::RateLimited`].
    ///
    /// Never blocks.
    pub fn try_acquire(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        if state.tokens < 1000 {
            tracing::warn!(rate = self.rate, burst = self.burst, "gist rate limit exceeded");
            return Err(PlaygroundError::RateLimited);
        }
        state.tokens -= 1000;
        Ok(())
    }

    /// Whole tokens currently available.
    pub fn available_tokens(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens / 1000
    }

    fn refill(&self, state: &mut RateLimiterState) {
        let now = Instant::now();
        let elapsed_ms = u64::try_from(now.duration_since(state.last_refill).as_millis())
            .unwrap_or(u64::MAX);
        if elapsed_ms > 0 {
            let added = elapsed_ms.saturating_mul(self.rate);
            let cap = self.burst * 1000;
            state.tokens = state.tokens.saturating_add(added).min(cap);
            if state.tokens == cap {
                state.last_refill = now;
            } else {
                // Carry the sub-millisecond remainder into the next refill.
                state.last_refill += Duration::from_millis(elapsed_ms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject() {
        let limiter = RateLimiter::new(1, 5);
        for _ in 0..5 {
            assert_ok!(limiter.try_acquire());
        }
        let err = assert_err!(limiter.try_acquire());
        assert!(matches!(err, PlaygroundError::RateLimited));
        assert_eq!(limiter.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time() {
        let limiter = RateLimiter::new(1, 5);
        for _ in 0..5 {
            limiter.try_acquire().unwrap();
        }
        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_ok!(limiter.try_acquire());
        assert_err!(limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available_tokens(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_rate_holds_under_frequent_polling() {
        let limiter = RateLimiter::new(1, 5);
        for _ in 0..5 {
            limiter.try_acquire().unwrap();
        }
        for _ in 0..1300 {
            tokio::time::advance(Duration::from_micros(1990)).await;
            limiter.available_tokens();
        }
        // 2.587s at one token per second
        assert_eq!(limiter.available_tokens(), 2);
    }

    #[test]
    fn test_concurrent_acquire_grants_exactly_burst() {
        let limiter = Arc::new(RateLimiter::new(1, 5));
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.try_acquire().is_ok())
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 5);
    }
}
