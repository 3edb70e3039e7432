//! # Rate Limiter
//!
//! Bounds pressure on an LLM provider.
//!
//! ## Algorithm
//!
//! - At most `max_concurrent` calls are in flight (semaphore permits)
//! - Successive call starts are at least `min_delay` apart
//!
//! Waiters are served in arrival order; the spacing lock is held while
//! sleeping so later callers queue behind earlier ones.

use crate::error::{LlmError, Result};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::trace;

/// Concurrency and spacing limiter shared by every LLM call of a process.
#[derive(Debug)]
pub struct RateLimiter {
    permits: Semaphore,
    max_concurrent: usize,
    min_delay: Duration,
    next_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Parameters
    ///
    /// - `max_concurrent`: maximum calls in flight (at least 1)
    /// - `min_delay`: minimum time between call starts
    #[must_use]
    pub fn new(max_concurrent: usize, min_delay: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            min_delay,
            next_start: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(Semaphore::MAX_PERMITS, Duration::ZERO)
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait for a call slot.
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Cancelled)?;

        let mut next_start = self.next_start.lock().await;
        if let Some(at) = *next_start {
            if at > Instant::now() {
                trace!(wait_ms = (at - Instant::now()).as_millis() as u64, "Rate limiter spacing");
                tokio::time::sleep_until(at).await;
            }
        }
        *next_start = Some(Instant::now() + self.min_delay);

        Ok(permit)
    }

    /// Calls currently holding a slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }
}

impl Default for RateLimiter {
    /// One call at a time, two seconds apart.
    fn default() -> Self {
        Self::new(1, Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_between_starts() {
        let limiter = RateLimiter::new(4, Duration::from_millis(500));
        let start = Instant::now();

        drop(limiter.acquire().await.unwrap());
        drop(limiter.acquire().await.unwrap());
        drop(limiter.acquire().await.unwrap());

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_concurrent_bounds_in_flight() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::ZERO));
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let _c = limiter.acquire().await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(a);
        waiter.await.unwrap();
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let limiter = RateLimiter::new(0, Duration::ZERO);
        assert_eq!(limiter.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let _a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);
    }
}
