//! Retry with exponential backoff.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bulwark_core::{Retry, RetryPolicy};
//! use std::time::Duration;
//!
//! let retry = Retry::new(
//!     RetryPolicy::exponential(4, Duration::from_millis(100))
//!         .max_delay(Duration::from_secs(2)),
//! );
//!
//! let body = retry.call(|| async {
//!     client.get("https://example.com/health").send().await
//! }).await?;
//! ```

use crate::clock::{Sleeper, TokioSleeper};
use crate::error::{PolicyError, RetryError};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound applied to every computed delay unless overridden.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Retry policy.
///
/// The delay after failed attempt `n` (1-based) is
/// `base_delay * backoff_multiplier^(n - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor applied per attempt. `1.0` gives a constant delay.
    pub backoff_multiplier: f64,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` and default backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Exponential backoff doubling from `base_delay`.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// Same delay between every attempt.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            backoff_multiplier: 1.0,
            max_delay: delay.max(DEFAULT_MAX_DELAY),
        }
    }

    /// Retry without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Set the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the delay cap.
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Check the policy for values the retry loop cannot honor.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier);
        }
        if self.max_delay < self.base_delay {
            return Err(PolicyError::MaxDelayBelowBase {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    ///
    /// Saturates at `max_delay`; never overflows for large attempt numbers.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.powi(exponent);
        let nanos = self.base_delay.as_nanos() as f64 * factor;

        // Inf, NaN and anything past u64 nanos all clamp to the cap.
        if !nanos.is_finite() || nanos < 0.0 || nanos >= u64::MAX as f64 {
            return self.max_delay;
        }

        Duration::from_nanos(nanos.round() as u64).min(self.max_delay)
    }
}

/// Retry executor.
#[derive(Clone)]
pub struct Retry {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    name: String,
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Retry {
    /// Create a retry executor that sleeps on the tokio timer.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            name: "default".to_string(),
        }
    }

    /// Replace the sleeper used between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Set the name used in log events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute with retry logic, retrying every error.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.run(f, |_| true, None).await
    }

    /// Execute, retrying only errors for which `should_retry` returns true.
    pub async fn call_if<F, Fut, T, E, P>(&self, f: F, should_retry: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
        P: Fn(&E) -> bool,
    {
        self.run(f, should_retry, None).await
    }

    /// Execute with retry logic until `token` is cancelled.
    ///
    /// Cancellation drops the in-flight attempt or interrupts the backoff
    /// sleep, whichever is pending.
    pub async fn call_with_cancel<F, Fut, T, E>(
        &self,
        f: F,
        token: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.run(f, |_| true, Some(token)).await
    }

    async fn run<F, Fut, T, E, P>(
        &self,
        mut f: F,
        should_retry: P,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
        P: Fn(&E) -> bool,
    {
        // A hand-built policy may carry 0; it still gets one attempt.
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<E> = None;
        let mut attempt: u32 = 1;

        loop {
            let result = match cancel {
                Some(token) => {
                    if token.is_cancelled() {
                        return Err(RetryError::Cancelled {
                            attempts: attempt - 1,
                            last_error,
                        });
                    }
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            debug!(name = %self.name, attempt, "Retry cancelled during attempt");
                            return Err(RetryError::Cancelled { attempts: attempt, last_error });
                        }
                        result = f() => result,
                    }
                }
                None => f().await,
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(name = %self.name, attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !should_retry(&error) {
                debug!(
                    name = %self.name,
                    attempt,
                    error = ?error,
                    "Error is not retryable, giving up"
                );
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            if attempt >= max_attempts {
                warn!(
                    name = %self.name,
                    attempt,
                    max_attempts,
                    error = ?error,
                    "Final retry attempt failed"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.policy.delay_for_attempt(attempt);
            debug!(
                name = %self.name,
                attempt,
                delay = ?delay,
                error = ?error,
                "Retry attempt failed, waiting before retry"
            );
            last_error = Some(error);

            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            debug!(name = %self.name, attempt, "Retry cancelled during backoff");
                            return Err(RetryError::Cancelled { attempts: attempt, last_error });
                        }
                        _ = self.sleeper.sleep(delay) => {}
                    }
                }
                None => self.sleeper.sleep(delay).await,
            }

            attempt += 1;
        }
    }
}

/// Retry `operation` according to `policy`, sleeping on the tokio timer.
pub async fn retry<F, Fut, T, E>(operation: F, policy: RetryPolicy) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
{
    Retry::new(policy).call(operation).await
}
