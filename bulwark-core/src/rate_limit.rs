//! Sliding window rate limiting.
//!
//! The limiter logs the instant of every admitted call and admits a new one
//! only while fewer than `max_calls` remain inside the trailing `window`.
//! There are no fixed window boundaries, so bursts cannot straddle two
//! windows to double the allowance.
//!
//! ## Example
//!
//! ```rust
//! use bulwark_core::{RateLimitConfig, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(10)));
//!
//! for _ in 0..3 {
//!     assert!(limiter.try_acquire());
//! }
//! assert!(!limiter.try_acquire());
//! assert!(limiter.retry_after().is_some());
//! ```

use crate::clock::{Clock, SystemClock};
use crate::error::{PolicyError, RateLimitError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Name for logging.
    pub name: String,
    /// Calls admitted per window.
    pub max_calls: u32,
    /// Length of the trailing window.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_calls: 100,
            window: Duration::from_secs(1),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            ..Default::default()
        }
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Reject a zero call limit or an empty window.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_calls == 0 {
            return Err(PolicyError::ZeroCallLimit);
        }
        if self.window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        Ok(())
    }
}

/// Sliding window log limiter for one logical dependency.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    log: Mutex<VecDeque<Instant>>,
    total_admitted: AtomicU64,
    total_rejections: AtomicU64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("in_window", &self.log.lock().len())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a rate limiter that reads time from `clock`.
    pub fn with_clock(config: RateLimitConfig, clock: impl Clock) -> Arc<Self> {
        info!(
            name = %config.name,
            max_calls = config.max_calls,
            window = ?config.window,
            "Rate limiter initialized"
        );

        Arc::new(Self {
            log: Mutex::new(VecDeque::with_capacity(config.max_calls.min(1024) as usize)),
            config,
            clock: Arc::new(clock),
            total_admitted: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn max_calls(&self) -> usize {
        self.config.max_calls.max(1) as usize
    }

    fn evict_expired(&self, log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = log.front() {
            if now.saturating_duration_since(oldest) >= self.config.window {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit a call, or return how long until the oldest one expires.
    fn admit(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut log = self.log.lock();
        self.evict_expired(&mut log, now);

        if log.len() < self.max_calls() {
            log.push_back(now);
            self.total_admitted.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        let retry_after = log
            .front()
            .map(|&oldest| self.config.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or_default();
        Err(retry_after)
    }

    /// Record a call if the window has room. Returns whether it was admitted.
    pub fn try_acquire(&self) -> bool {
        self.admit().is_ok()
    }

    /// Execute `f` if the window has room.
    ///
    /// The call counts against the window whether or not `f` succeeds.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, RateLimitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(retry_after) = self.admit() {
            debug!(
                name = %self.config.name,
                retry_after = ?retry_after,
                "Rate limit exceeded, call rejected"
            );
            return Err(RateLimitError::Exceeded {
                max_calls: self.config.max_calls,
                window: self.config.window,
                retry_after,
            });
        }

        f().await.map_err(RateLimitError::Execution)
    }

    /// Calls that would still be admitted in the current window.
    pub fn remaining(&self) -> u32 {
        let mut log = self.log.lock();
        self.evict_expired(&mut log, self.clock.now());
        let left = self.max_calls().saturating_sub(log.len());
        u32::try_from(left).unwrap_or(u32::MAX)
    }

    /// Time until a call can be admitted, or `None` if one can be now.
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut log = self.log.lock();
        self.evict_expired(&mut log, now);

        if log.len() < self.max_calls() {
            return None;
        }
        log.front()
            .map(|&oldest| self.config.window.saturating_sub(now.saturating_duration_since(oldest)))
    }

    /// Forget every logged call.
    pub fn reset(&self) {
        self.log.lock().clear();
        debug!(name = %self.config.name, "Rate limiter reset");
    }

    pub fn total_admitted(&self) -> u64 {
        self.total_admitted.load(Ordering::Relaxed)
    }

    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicU32;

    fn limiter(max_calls: u32, window_ms: u64) -> (Arc<RateLimiter>, ManualClock) {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_clock(
            RateLimitConfig::new(max_calls, Duration::from_millis(window_ms)).name("test"),
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_basic_limit() {
        let (limiter, _clock) = limiter(3, 10_000);

        for left in (0..3).rev() {
            assert!(limiter.try_acquire());
            assert_eq!(limiter.remaining(), left);
        }

        assert!(!limiter.try_acquire());
        assert_eq!(limiter.total_admitted(), 3);
        assert_eq!(limiter.total_rejections(), 1);
    }

    #[test]
    fn test_call_expires_exactly_at_window_end() {
        let (limiter, clock) = limiter(1, 1000);

        assert!(limiter.try_acquire());
        clock.advance(Duration::from_millis(999));
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_millis(1));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = limiter(2, 1000);

        assert!(limiter.try_acquire()); // t = 0
        clock.advance(Duration::from_millis(600));
        assert!(limiter.try_acquire()); // t = 600

        clock.advance(Duration::from_millis(100));
        assert_eq!(limiter.retry_after(), Some(Duration::from_millis(300)));
        assert!(!limiter.try_acquire());

        // Only the t = 0 call has left the window.
        clock.advance(Duration::from_millis(300));
        assert_eq!(limiter.retry_after(), None);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_call_rejected_without_invoking() {
        let (limiter, _clock) = limiter(1, 10_000);
        let invoked = AtomicU32::new(0);

        let first = limiter
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("upstream error")
            })
            .await;
        assert!(matches!(first, Err(RateLimitError::Execution("upstream error"))));

        let second = limiter
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await
            .unwrap_err();

        assert!(second.is_exceeded());
        assert_eq!(second.retry_after(), Some(Duration::from_secs(10)));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_clears_window() {
        let (limiter, _clock) = limiter(1, 10_000);

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        limiter.reset();
        assert_eq!(limiter.remaining(), 1);
        assert!(limiter.try_acquire());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_across_tasks() {
        let (limiter, _clock) = limiter(5, 60_000);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.try_acquire() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 5);
        assert_eq!(limiter.total_rejections(), 15);
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());
        assert_eq!(
            RateLimitConfig::new(0, Duration::from_secs(1)).validate(),
            Err(PolicyError::ZeroCallLimit)
        );
        assert_eq!(
            RateLimitConfig::new(3, Duration::ZERO).validate(),
            Err(PolicyError::ZeroWindow)
        );
    }
}
