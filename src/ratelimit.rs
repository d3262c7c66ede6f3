// src/ratelimit.rs

//! Process-wide request throttle.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between outbound requests.
///
/// One instance is constructed at startup and shared by every transport path,
/// so the whole process emits at most one request per interval. `acquire`
/// never errors; it sleeps as long as needed and then stamps the clock.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Limiter configured in milliseconds, as the config file expresses it.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until the interval since the previous acquisition has elapsed.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_acquire_returns_immediately() {
        let limiter = RateLimiter::from_millis(10_000);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_waits_out_the_interval() {
        let limiter = RateLimiter::from_millis(500);
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_interval_does_not_wait() {
        let limiter = RateLimiter::from_millis(100);
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
