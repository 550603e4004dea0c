// Error types for the Bulwark resilience primitives

use std::time::Duration;
use thiserror::Error;

/// Error returned by [`Retry`](crate::Retry) once it stops retrying.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the error of the final attempt.
    #[error("Failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error returned by the last attempt.
        last_error: E,
    },

    /// The retry predicate rejected the error, so no further attempts were made.
    #[error("Not retryable after {attempts} attempts: {last_error}")]
    Aborted {
        /// Number of attempts made.
        attempts: u32,
        /// Error the predicate rejected.
        last_error: E,
    },

    /// The cancellation token fired during an attempt or a backoff sleep.
    #[error("Cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of attempts started.
        attempts: u32,
        /// Error of the last completed attempt, if any completed.
        last_error: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before the retry loop stopped.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Aborted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Last error returned by the operation.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last_error, .. } | Self::Aborted { last_error, .. } => {
                Some(last_error)
            }
            Self::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Consume the error and return the last underlying error.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { last_error, .. } | Self::Aborted { last_error, .. } => {
                Some(last_error)
            }
            Self::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Whether the loop stopped because attempts ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Whether the loop stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Circuit breaker error.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not invoked.
    #[error("Circuit breaker is open")]
    Open,

    /// Operation was invoked and failed.
    #[error("Execution failed: {0}")]
    Execution(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was short-circuited without invoking the operation.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Error returned by the operation, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open => None,
            Self::Execution(e) => Some(e),
        }
    }
}

/// Timeout error.
#[derive(Error, Debug)]
pub enum TimeoutError<E> {
    /// Operation did not finish within the deadline.
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),

    /// Operation finished in time but failed.
    #[error("Operation failed: {0}")]
    Execution(E),

    /// The cancellation token fired before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Error returned by [`RateLimiter::call`](crate::RateLimiter::call).
#[derive(Error, Debug)]
pub enum RateLimitError<E> {
    /// The window is full; the operation was not invoked.
    #[error("Rate limit exceeded: {max_calls} calls per {window:?}")]
    Exceeded {
        max_calls: u32,
        window: Duration,
        /// Time until the oldest admitted call leaves the window.
        retry_after: Duration,
    },

    #[error("Execution failed: {0}")]
    Execution(E),
}

impl<E> RateLimitError<E> {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }

    /// Suggested wait before the next call can be admitted.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Exceeded { retry_after, .. } => Some(*retry_after),
            Self::Execution(_) => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Execution(e) => Some(e),
            Self::Exceeded { .. } => None,
        }
    }
}

/// A panic caught by [`Outcome::catch`](crate::Outcome::catch).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Operation panicked: {message}")]
pub struct Panicked {
    /// Panic payload rendered as text.
    pub message: String,
}

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Invalid policy or breaker configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff_multiplier must be a finite number >= 1.0")]
    InvalidMultiplier,

    #[error("max_delay ({max:?}) must not be shorter than base_delay ({base:?})")]
    MaxDelayBelowBase { base: Duration, max: Duration },

    #[error("failure_threshold must be at least 1")]
    ZeroThreshold,

    #[error("timeout duration must be greater than zero")]
    ZeroTimeout,

    #[error("max_calls must be at least 1")]
    ZeroCallLimit,

    #[error("rate limit window must be greater than zero")]
    ZeroWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_error_display() {
        let err: RetryError<&str> = RetryError::Exhausted {
            attempts: 3,
            last_error: "connection refused",
        };
        assert_eq!(err.to_string(), "Failed after 3 attempts: connection refused");
        assert_eq!(err.attempts(), 3);
        assert!(err.is_exhausted());
    }

    #[test]
    fn test_cancelled_without_completed_attempt() {
        let err: RetryError<&str> = RetryError::Cancelled {
            attempts: 1,
            last_error: None,
        };
        assert!(err.is_cancelled());
        assert!(err.last_error().is_none());
        assert_eq!(err.into_last_error(), None);
    }

    #[test]
    fn test_circuit_breaker_error_inner() {
        let open: CircuitBreakerError<&str> = CircuitBreakerError::Open;
        assert!(open.is_open());
        assert_eq!(open.into_inner(), None);

        let failed = CircuitBreakerError::Execution("boom");
        assert_eq!(failed.to_string(), "Execution failed: boom");
        assert_eq!(failed.into_inner(), Some("boom"));
    }

    #[test]
    fn test_panicked_payloads() {
        let p = Panicked::from_payload(Box::new("static message"));
        assert_eq!(p.message, "static message");

        let p = Panicked::from_payload(Box::new(String::from("owned message")));
        assert_eq!(p.message, "owned message");

        let p = Panicked::from_payload(Box::new(7u8));
        assert_eq!(p.message, "non-string panic payload");
    }

    #[test]
    fn test_rate_limit_error_display() {
        let err: RateLimitError<&str> = RateLimitError::Exceeded {
            max_calls: 3,
            window: Duration::from_secs(10),
            retry_after: Duration::from_secs(4),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded: 3 calls per 10s");
        assert!(err.is_exceeded());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
        assert_eq!(err.into_inner(), None);
    }
}
