//! Injectable time sources.
//!
//! The circuit breaker reads the current time through a [`Clock`] and the
//! retry loop waits through a [`Sleeper`], so tests can drive both without
//! real delays.
//!
//! ## Example
//!
//! ```rust
//! use bulwark_core::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now() - start, Duration::from_secs(5));
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by the tokio time driver.
///
/// Honors `tokio::time::pause()` in tests; outside a paused runtime it
/// behaves like `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward.
    ///
    /// Stops at the latest instant the platform can represent.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        let mut next = offset.saturating_add(by);
        while self.base.checked_add(next).is_none() {
            next = *offset + (next - *offset) / 2;
        }
        *offset = next;
    }

    /// Total time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Suspends the caller between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync + 'static {
    /// Wait for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// Sleeper that uses `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Sleeper that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _delay: Duration) {}
}

/// Sleeper that records every requested delay without waiting.
///
/// When built with [`RecordingSleeper::with_clock`], each sleep also
/// advances the given [`ManualClock`], which lets a retry loop and a circuit
/// breaker share one simulated timeline.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
    clock: Option<ManualClock>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder that advances `clock` by every recorded delay.
    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            delays: Arc::default(),
            clock: Some(clock),
        }
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.delays
            .lock()
            .iter()
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(*d))
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
        if let Some(clock) = &self.clock {
            clock.advance(delay);
        }
    }
}
