//! Timeout pattern for operations.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bulwark_core::{Timeout, TimeoutConfig};
//! use std::time::Duration;
//!
//! let timeout = Timeout::new(TimeoutConfig::new(Duration::from_secs(5)).name("search"));
//!
//! let hits = timeout.call(|| async {
//!     index.search(query).await
//! }).await?;
//! ```

use crate::error::{PolicyError, TimeoutError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Name for logging.
    pub name: String,
    /// Timeout duration.
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            duration: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Reject a zero duration.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.duration.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Timeout executor.
#[derive(Debug, Clone)]
pub struct Timeout {
    config: TimeoutConfig,
}

impl Timeout {
    /// Create a new timeout executor.
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    /// Create with a duration.
    pub fn with_duration(duration: Duration) -> Self {
        Self::new(TimeoutConfig::new(duration))
    }

    /// Get the timeout duration.
    pub fn duration(&self) -> Duration {
        self.config.duration
    }

    /// Execute with timeout.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, TimeoutError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.config.duration, f()).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(TimeoutError::Execution(e)),
            Err(_) => {
                warn!(
                    name = %self.config.name,
                    duration = ?self.config.duration,
                    "Operation timed out"
                );
                Err(TimeoutError::Elapsed(self.config.duration))
            }
        }
    }

    /// Execute with timeout, also stopping when `token` is cancelled.
    pub async fn call_with_cancel<F, Fut, T, E>(
        &self,
        f: F,
        token: &CancellationToken,
    ) -> Result<T, TimeoutError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(name = %self.config.name, "Operation cancelled before deadline");
                Err(TimeoutError::Cancelled)
            }
            result = self.call(f) => result,
        }
    }
}

/// Execute a future with a timeout.
pub async fn with_timeout<F, Fut, T>(duration: Duration, f: F) -> Result<T, Duration>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    match tokio::time::timeout(duration, f()).await {
        Ok(result) => Ok(result),
        Err(_) => Err(duration),
    }
}

/// Execute a fallible future with a timeout.
pub async fn with_timeout_result<F, Fut, T, E>(
    duration: Duration,
    f: F,
) -> Result<T, TimeoutError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    Timeout::with_duration(duration).call(f).await
}
