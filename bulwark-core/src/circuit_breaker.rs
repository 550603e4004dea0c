//! Circuit Breaker pattern implementation.
//!
//! The circuit breaker stops forwarding calls to a dependency that keeps
//! failing, and lets one trial call through after a cooldown to find out
//! whether it has recovered.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls pass through
//! - **Open**: Circuit is tripped, calls are rejected without running
//! - **Half-Open**: A single trial call decides between Closed and Open
//!
//! ## Example
//!
//! ```rust,ignore
//! use bulwark_core::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("inventory")
//!         .failure_threshold(5)
//!         .cooldown_period(Duration::from_secs(30)),
//! );
//!
//! match circuit.call(|| async { inventory.fetch(sku).await }).await {
//!     Ok(stock) => render(stock),
//!     Err(CircuitBreakerError::Open) => render_cached(sku),
//!     Err(CircuitBreakerError::Execution(e)) => return Err(e.into()),
//! }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::error::{CircuitBreakerError, PolicyError};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally.
    Closed,
    /// Circuit is open, calls are rejected.
    Open,
    /// Circuit is half-open, one trial call is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Name of the circuit breaker (for logging/stats).
    pub name: String,
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to stay open before a trial call is allowed.
    pub cooldown_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            cooldown_period: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the cooldown period.
    pub fn cooldown_period(mut self, cooldown: Duration) -> Self {
        self.cooldown_period = cooldown;
        self
    }

    /// Reject a zero failure threshold.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.failure_threshold == 0 {
            return Err(PolicyError::ZeroThreshold);
        }
        Ok(())
    }
}

/// Internal circuit breaker state, guarded by one lock so transitions are atomic.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// What an admitted call is allowed to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    /// Regular call while closed.
    Normal,
    /// The single half-open trial.
    Trial,
}

/// Circuit breaker for one logical dependency.
///
/// Shared between tasks through the returned `Arc`.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerState>,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    total_rejections: AtomicU64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Arc<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker that reads time from `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: impl Clock) -> Arc<Self> {
        info!(
            name = %config.name,
            failure_threshold = config.failure_threshold,
            cooldown_period = ?config.cooldown_period,
            "Circuit breaker initialized"
        );

        Arc::new(Self {
            config,
            clock: Arc::new(clock),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        })
    }

    /// Create with default configuration.
    pub fn default_circuit() -> Arc<Self> {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Current circuit state. Never triggers a transition.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get the circuit breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration in use.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a call made now would be forwarded. Does not change state.
    pub fn is_call_permitted(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.cooldown_elapsed(&inner),
            CircuitState::HalfOpen => !inner.trial_in_flight,
        }
    }

    /// Execute a function with circuit breaker protection.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let Some(permit) = self.try_acquire() else {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            debug!(
                name = %self.config.name,
                state = %self.state(),
                "Circuit breaker rejected call"
            );
            return Err(CircuitBreakerError::Open);
        };

        let mut guard = PermitGuard {
            breaker: self,
            permit: Some(permit),
        };

        match f().await {
            Ok(result) => {
                guard.complete(true);
                Ok(result)
            }
            Err(e) => {
                guard.complete(false);
                Err(CircuitBreakerError::Execution(e))
            }
        }
    }

    /// Execute, returning `fallback()` instead of an error while the circuit rejects calls.
    ///
    /// Errors from the operation itself are still returned.
    pub async fn call_with_fallback<F, Fut, T, E, Fb>(&self, f: F, fallback: Fb) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> T,
    {
        match self.call(f).await {
            Ok(result) => Ok(result),
            Err(CircuitBreakerError::Open) => {
                debug!(name = %self.config.name, "Circuit open, using fallback");
                Ok(fallback())
            }
            Err(CircuitBreakerError::Execution(e)) => Err(e),
        }
    }

    /// Record a successful operation performed outside [`call`](Self::call).
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        let permit = match inner.state {
            CircuitState::HalfOpen => Permit::Trial,
            _ => Permit::Normal,
        };
        self.on_success(&mut inner, permit);
    }

    /// Record a failed operation performed outside [`call`](Self::call).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let permit = match inner.state {
            CircuitState::HalfOpen => Permit::Trial,
            _ => Permit::Normal,
        };
        self.on_failure(&mut inner, permit);
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.close(&mut inner);
    }

    /// Manually force the circuit open.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.open(&mut inner);
    }

    fn try_acquire(&self) -> Option<Permit> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(Permit::Normal),
            CircuitState::Open => {
                if !self.cooldown_elapsed(&inner) {
                    return None;
                }
                debug!(name = %self.config.name, "Circuit breaker transitioning to HALF-OPEN");
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                Some(Permit::Trial)
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(Permit::Trial)
                }
            }
        }
    }

    fn cooldown_elapsed(&self, inner: &BreakerState) -> bool {
        match inner.opened_at {
            Some(opened_at) => {
                self.clock.now().saturating_duration_since(opened_at) >= self.config.cooldown_period
            }
            None => true,
        }
    }

    fn on_success(&self, inner: &mut BreakerState, permit: Permit) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        match (inner.state, permit) {
            (CircuitState::Closed, _) => inner.failure_count = 0,
            (CircuitState::HalfOpen, Permit::Trial) => self.close(inner),
            // A call admitted before the circuit tripped finished late.
            _ => debug!(name = %self.config.name, "Ignoring stale success"),
        }
    }

    fn on_failure(&self, inner: &mut BreakerState, permit: Permit) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        match (inner.state, permit) {
            (CircuitState::Closed, _) => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold.max(1) {
                    self.open(inner);
                }
            }
            (CircuitState::HalfOpen, Permit::Trial) => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                self.open(inner);
            }
            _ => {}
        }
    }

    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            debug!(name = %self.config.name, "Half-open trial abandoned");
            inner.trial_in_flight = false;
        }
    }

    /// Enter (or re-enter) Open and restart the cooldown.
    fn open(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            warn!(
                name = %self.config.name,
                failures = inner.failure_count,
                from = %inner.state,
                "Circuit breaker OPENED"
            );
        }
        inner.state = CircuitState::Open;
        inner.opened_at = Some(self.clock.now());
        inner.trial_in_flight = false;
    }

    fn close(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Closed {
            info!(name = %self.config.name, "Circuit breaker CLOSED");
        }
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.failure_count = 0;
        inner.trial_in_flight = false;
    }

    // Metrics

    /// Get the current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Get total calls seen, including rejected ones.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Get total successful calls.
    pub fn total_successes(&self) -> u64 {
        self.total_successes.load(Ordering::Relaxed)
    }

    /// Get total failed calls.
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Get total rejected calls (circuit open).
    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: inner.state,
            total_requests: self.total_requests(),
            total_successes: self.total_successes(),
            total_failures: self.total_failures(),
            total_rejections: self.total_rejections(),
            current_failure_count: inner.failure_count,
        }
    }
}

/// Reports the result of an admitted call, or frees the trial slot if the
/// call future is dropped before finishing.
struct PermitGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Option<Permit>,
}

impl PermitGuard<'_> {
    fn complete(&mut self, success: bool) {
        if let Some(permit) = self.permit.take() {
            let mut inner = self.breaker.inner.lock();
            if success {
                self.breaker.on_success(&mut inner, permit);
            } else {
                self.breaker.on_failure(&mut inner, permit);
            }
        }
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if self.permit.take() == Some(Permit::Trial) {
            self.breaker.release_trial();
        }
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Circuit breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Total requests.
    pub total_requests: u64,
    /// Total successes.
    pub total_successes: u64,
    /// Total failures.
    pub total_failures: u64,
    /// Total rejections.
    pub total_rejections: u64,
    /// Current consecutive failure count.
    pub current_failure_count: u32,
}

impl CircuitBreakerStats {
    /// Calculate success rate (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.total_successes as f64 / self.total_requests as f64
        }
    }

    /// Calculate failure rate (0.0 - 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_requests as f64
        }
    }
}
