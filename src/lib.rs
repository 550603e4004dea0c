// Bulwark - resilience toolkit for async Rust
//
// Wraps fallible operations in outcomes, retries them with capped exponential
// backoff and guards dependencies behind circuit breakers.

// Re-export core functionality
pub use bulwark_core::*;

// Re-export optional crates
#[cfg(feature = "log")]
pub use bulwark_log;

#[cfg(feature = "config")]
pub use bulwark_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CancellationToken,
        CircuitBreaker,
        CircuitBreakerConfig,
        CircuitBreakerError,
        CircuitState,
        Fallback,
        Outcome,
        RateLimitConfig,
        RateLimitError,
        RateLimiter,
        Retry,
        RetryError,
        RetryPolicy,
        Timeout,
        TimeoutConfig,
        TimeoutError,
        fallback_value,
        retry,
        to_outcome,
        with_timeout,
    };
}
