//! Process-wide token bucket for outbound requests.

use crate::config::RateLimitConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every outgoing attempt.
///
/// Holds up to `burst` tokens and refills continuously at
/// `per_minute / 60` tokens per second. One token is consumed per attempt,
/// retries included.
#[derive(Debug)]
pub struct TokenBucket {
    per_minute: u32,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            per_minute: config.per_minute.max(1),
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_per_sec(&self) -> f64 {
        f64::from(self.per_minute) / 60.0
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec()).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Take a token without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state, Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take a token, waiting for the refill if the bucket is empty.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state, Instant::now());
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return started.elapsed();
                }
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_sec()).max(Duration::from_millis(1))
            };
            debug!(wait_ms = wait.as_millis() as u64, "Rate-limit budget exhausted, waiting");
            sleep(wait).await;
        }
    }

    /// Tokens currently available, rounded down.
    pub async fn available(&self) -> u32 {
        let mut state = self.state.lock().await;
        self.refill(&mut state, Instant::now());
        state.tokens.floor().max(0.0) as u32
    }
}
