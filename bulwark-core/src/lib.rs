//! # Bulwark Core
//!
//! Resilience primitives for async Rust.
//!
//! ## Patterns Included
//!
//! - **Outcome**: Success-or-failure values that chain without early returns
//! - **Retry**: Bounded retries with capped exponential backoff
//! - **Circuit Breaker**: Stop calling a failing dependency until it recovers
//! - **Timeout**: Deadlines for individual operations
//! - **Fallback**: Replacement values for failed outcomes
//! - **Rate Limiter**: Cap calls per sliding time window
//!
//! Time is read through an injectable [`Clock`] and waited on through an
//! injectable [`Sleeper`], so every pattern can be tested without real delays.
//!
//! ## Quick Start
//!
//! ```rust
//! use bulwark_core::{CircuitBreaker, CircuitBreakerConfig, Retry, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let circuit = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("ledger").failure_threshold(5),
//! );
//! let retry = Retry::new(RetryPolicy::exponential(3, Duration::from_millis(1)));
//!
//! let balance = retry
//!     .call(|| circuit.call(|| async { Ok::<_, std::io::Error>(100) }))
//!     .await
//!     .unwrap();
//! assert_eq!(balance, 100);
//! # });
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod fallback;
pub mod outcome;
pub mod rate_limit;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::*;
pub use clock::*;
pub use error::*;
pub use fallback::*;
pub use outcome::*;
pub use rate_limit::*;
pub use retry::*;
pub use timeout::*;

pub use tokio_util::sync::CancellationToken;
