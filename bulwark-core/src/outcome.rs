//! Outcome wrapper for composing fallible steps without early returns.
//!
//! An [`Outcome`] holds either a success value or a failure value. Steps are
//! chained with [`Outcome::map_success`] and friends; once a step fails the
//! remaining mappers are skipped entirely. [`Outcome::into_result`] is the
//! one place where a failure turns back into an `Err` that `?` can
//! propagate, and [`to_outcome`] is the conversion in the other direction.
//!
//! ## Example
//!
//! ```rust
//! use bulwark_core::Outcome;
//!
//! let port = Outcome::of(|| "8080".parse::<u16>())
//!     .map_success(|p| p + 1)
//!     .map_failure(|e| e.to_string());
//!
//! assert_eq!(port.unwrap_or(80), 8081);
//! ```

use crate::error::Panicked;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Success-or-failure value. Exactly one side is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "an Outcome may hold a failure that should be inspected"]
pub enum Outcome<T, E> {
    /// The computation produced a value.
    Success(T),
    /// The computation failed.
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    /// Run a fallible closure and capture its result.
    pub fn of<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, E>,
    {
        f().into()
    }

    /// Await a fallible future and capture its result.
    pub async fn of_async<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        f().await.into()
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether this is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Success value, discarding any failure.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Failure(_) => None,
        }
    }

    /// Failure value, discarding any success.
    pub fn failure(self) -> Option<E> {
        match self {
            Self::Success(_) => None,
            Self::Failure(e) => Some(e),
        }
    }

    /// Borrow both sides.
    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Self::Success(v) => Outcome::Success(v),
            Self::Failure(e) => Outcome::Failure(e),
        }
    }

    /// Transform the success value. Not called on a failure.
    pub fn map_success<U, F>(self, f: F) -> Outcome<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::Failure(e) => Outcome::Failure(e),
        }
    }

    /// Transform the success value with a step that may itself fail.
    ///
    /// An error from `f` becomes the new failure. Not called on a failure.
    pub fn try_map_success<U, F>(self, f: F) -> Outcome<U, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        match self {
            Self::Success(v) => f(v).into(),
            Self::Failure(e) => Outcome::Failure(e),
        }
    }

    /// Transform the failure value. Not called on a success.
    pub fn map_failure<G, F>(self, f: F) -> Outcome<T, G>
    where
        F: FnOnce(E) -> G,
    {
        match self {
            Self::Success(v) => Outcome::Success(v),
            Self::Failure(e) => Outcome::Failure(f(e)),
        }
    }

    /// Success value or `default`.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Self::Success(v) => v,
            Self::Failure(_) => default,
        }
    }

    /// Success value or one computed from the failure.
    pub fn unwrap_or_else<F>(self, f: F) -> T
    where
        F: FnOnce(E) -> T,
    {
        match self {
            Self::Success(v) => v,
            Self::Failure(e) => f(e),
        }
    }

    /// Convert back into a `Result` so the failure can be propagated with `?`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failure(e) => Err(e),
        }
    }
}

impl<T> Outcome<T, Panicked> {
    /// Run a closure, turning a panic into a failure.
    ///
    /// The closure is treated as unwind safe; state it touched may be
    /// inconsistent after a caught panic.
    pub fn catch<F>(f: F) -> Self
    where
        F: FnOnce() -> T,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(v) => Self::Success(v),
            Err(payload) => Self::Failure(Panicked::from_payload(payload)),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Success(v),
            Err(e) => Self::Failure(e),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        outcome.into_result()
    }
}

/// Run a `Result`-returning closure and wrap its result in an [`Outcome`].
pub fn to_outcome<T, E, F>(f: F) -> Outcome<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    Outcome::of(f)
}
