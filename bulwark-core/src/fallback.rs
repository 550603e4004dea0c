//! Recovery values for failed operations.
//!
//! A [`Fallback`] turns a failed [`Outcome`] into a replacement value. It
//! runs after the failure is known, so it composes with anything that
//! produces an `Outcome` or a `Result`: a [`Retry`](crate::Retry) that ran out
//! of attempts, an open [`CircuitBreaker`](crate::CircuitBreaker), or a
//! panic caught by [`Outcome::catch`].
//!
//! ```rust
//! use bulwark_core::{Outcome, fallback_value};
//!
//! let cached = fallback_value("cached price").only_if(|e: &&str| *e == "timeout");
//!
//! assert_eq!(cached.recover(Outcome::Failure("timeout")).success(), Some("cached price"));
//! assert_eq!(cached.recover(Outcome::Failure("forbidden")).failure(), Some("forbidden"));
//! ```

use crate::outcome::Outcome;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type Recover<T, E> = Arc<dyn Fn(E) -> Outcome<T, E> + Send + Sync>;

/// Replacement strategy applied to a failure.
///
/// A recovery may itself fail by returning `Outcome::Failure`; see
/// [`or_else`](Self::or_else) for trying several strategies in order.
pub struct Fallback<T, E> {
    recover: Recover<T, E>,
    name: String,
}

impl<T: 'static, E: 'static> Fallback<T, E> {
    /// Create a fallback from a recovery function.
    pub fn new<F>(recover: F) -> Self
    where
        F: Fn(E) -> Outcome<T, E> + Send + Sync + 'static,
    {
        Self {
            recover: Arc::new(recover),
            name: "default".to_string(),
        }
    }

    /// Set the name used in log events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recover only failures accepted by `predicate`; others pass through.
    pub fn only_if<P>(self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let recover = self.recover;
        Self {
            recover: Arc::new(move |e| {
                if predicate(&e) {
                    recover(e)
                } else {
                    Outcome::Failure(e)
                }
            }),
            name: self.name,
        }
    }

    /// Hand the failure to `next` when this recovery fails as well.
    pub fn or_else(self, next: Fallback<T, E>) -> Self {
        let first = self.recover;
        let second = next.recover;
        let next_name = next.name;

        Self {
            recover: Arc::new(move |e| match first(e) {
                Outcome::Failure(e) => {
                    debug!(next = %next_name, "Fallback failed, trying next");
                    second(e)
                }
                recovered => recovered,
            }),
            name: self.name,
        }
    }

    /// Apply the recovery to a failure. A success is returned untouched.
    pub fn recover(&self, outcome: Outcome<T, E>) -> Outcome<T, E> {
        match outcome {
            Outcome::Failure(e) => {
                debug!(name = %self.name, "Operation failed, using fallback");
                (self.recover)(e)
            }
            success => success,
        }
    }

    /// Await `primary` and recover its failure.
    pub async fn call<F, Fut>(&self, primary: F) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.recover(Outcome::of_async(primary).await)
    }
}

impl<T, E> Clone for Fallback<T, E> {
    fn clone(&self) -> Self {
        Self {
            recover: Arc::clone(&self.recover),
            name: self.name.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Fallback<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallback").field("name", &self.name).finish()
    }
}

/// Recover every failure with a clone of `value`.
pub fn fallback_value<T, E>(value: T) -> Fallback<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: 'static,
{
    Fallback::new(move |_| Outcome::Success(value.clone()))
}

/// Recover every failure with `T::default()`.
pub fn fallback_default<T, E>() -> Fallback<T, E>
where
    T: Default + 'static,
    E: 'static,
{
    Fallback::new(|_| Outcome::Success(T::default()))
}

/// Recover every failure with a value derived from the error.
pub fn fallback_with<T, E, F>(f: F) -> Fallback<T, E>
where
    T: 'static,
    E: 'static,
    F: Fn(&E) -> T + Send + Sync + 'static,
{
    Fallback::new(move |e| Outcome::Success(f(&e)))
}
