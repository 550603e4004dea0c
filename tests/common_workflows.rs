//! Integration tests for common Bulwark workflows.
//!
//! These tests compose the primitives the way application code does.

use bulwark::*;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// =============================================================================
// Circuit Breaker Scenario Tests
// =============================================================================

#[tokio::test]
async fn test_breaker_trips_and_recovers() {
    let clock = ManualClock::new();
    let circuit = CircuitBreaker::with_clock(
        CircuitBreakerConfig::new("orders")
            .failure_threshold(2)
            .cooldown_period(Duration::from_millis(1000)),
        clock.clone(),
    );
    let invocations = AtomicU32::new(0);
    let invocations = &invocations;

    // Two failures trip the circuit.
    for expected in [CircuitState::Closed, CircuitState::Open] {
        let result = circuit
            .call_with_fallback(
                move || async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Err::<&str, _>(io::Error::other("orders unavailable"))
                },
                || "cached",
            )
            .await;
        assert!(result.is_err());
        assert_eq!(circuit.state(), expected);
    }
    assert_eq!(circuit.failure_count(), 2);

    // While open, the fallback answers and the operation is never invoked.
    let result = circuit
        .call_with_fallback(
            move || async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>("live")
            },
            || "cached",
        )
        .await;
    assert_eq!(result.unwrap(), "cached");
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // After the cooldown a single trial goes through and closes the circuit.
    clock.advance(Duration::from_millis(1000));
    let breaker = &circuit;
    let result = circuit
        .call_with_fallback(
            move || async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                assert_eq!(breaker.state(), CircuitState::HalfOpen);
                Ok::<_, io::Error>("live")
            },
            || "cached",
        )
        .await;
    assert_eq!(result.unwrap(), "live");
    assert_eq!(circuit.state(), CircuitState::Closed);
    assert_eq!(circuit.failure_count(), 0);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    let stats = circuit.stats();
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.total_rejections, 1);
}

// =============================================================================
// Retry + Circuit Breaker Tests
// =============================================================================

#[tokio::test]
async fn test_retry_waits_out_open_circuit() {
    let clock = ManualClock::new();
    let sleeper = RecordingSleeper::with_clock(clock.clone());
    let circuit = CircuitBreaker::with_clock(
        CircuitBreakerConfig::new("inventory")
            .failure_threshold(3)
            .cooldown_period(Duration::from_millis(500)),
        clock.clone(),
    );
    let retry = Retry::new(RetryPolicy::exponential(5, Duration::from_millis(100)))
        .with_sleeper(sleeper.clone())
        .with_name("inventory");

    let calls = AtomicU32::new(0);
    let calls = &calls;
    let breaker = &circuit;

    let result = retry
        .call(move || {
            breaker.call(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 {
                    Err(io::Error::other("inventory unavailable"))
                } else {
                    Ok(n)
                }
            })
        })
        .await;

    // Attempts 1-3 fail and trip the circuit, attempt 4 is rejected while
    // open, attempt 5 is the half-open trial and succeeds.
    assert_eq!(result.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(circuit.state(), CircuitState::Closed);
    assert_eq!(circuit.total_rejections(), 1);
    assert_eq!(
        sleeper.delays(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
        ]
    );
    assert_eq!(clock.elapsed(), Duration::from_millis(1500));
}

#[tokio::test]
async fn test_retry_stops_on_open_circuit_when_not_retryable() {
    let circuit = CircuitBreaker::new(CircuitBreakerConfig::new("search").failure_threshold(1));
    circuit.force_open();

    let retry = Retry::new(RetryPolicy::immediate(4)).with_sleeper(InstantSleeper);
    let breaker = &circuit;

    let err = retry
        .call_if(
            move || breaker.call(|| async { Ok::<_, io::Error>(()) }),
            |e: &CircuitBreakerError<io::Error>| !e.is_open(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RetryError::Aborted { attempts: 1, .. }));
    assert!(err.last_error().is_some_and(CircuitBreakerError::is_open));
}

// =============================================================================
// Rate Limiter Tests
// =============================================================================

#[tokio::test]
async fn test_retry_backs_off_until_rate_window_reopens() {
    let clock = ManualClock::new();
    let sleeper = RecordingSleeper::with_clock(clock.clone());
    let limiter = RateLimiter::with_clock(
        RateLimitConfig::new(2, Duration::from_millis(1000)).name("geocoder"),
        clock.clone(),
    );
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());

    let retry = Retry::new(RetryPolicy::constant(3, Duration::from_millis(1000)))
        .with_sleeper(sleeper.clone());
    let gate = &limiter;

    let result = retry
        .call_if(
            move || gate.call(|| async { Ok::<_, io::Error>("52.52,13.40") }),
            RateLimitError::is_exceeded,
        )
        .await;

    assert_eq!(result.unwrap(), "52.52,13.40");
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000)]);
    assert_eq!(limiter.total_rejections(), 1);
    assert_eq!(limiter.remaining(), 1);
}

// =============================================================================
// Timeout + Retry Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_each_attempt_under_deadline() {
    let attempts = AtomicU32::new(0);
    let attempts = &attempts;
    let timeout = Timeout::new(TimeoutConfig::new(Duration::from_millis(50)).name("profile"));
    let deadline = &timeout;

    let result = retry(
        move || {
            deadline.call(move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                // The first two attempts hang past the deadline.
                if n < 3 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok::<_, io::Error>(n)
            })
        },
        RetryPolicy::constant(3, Duration::from_millis(10)),
    )
    .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_retry_loop() {
    let token = CancellationToken::new();
    let child = token.clone();
    let retry = Retry::new(RetryPolicy::constant(10, Duration::from_secs(5)));

    let handle = tokio::spawn(async move {
        retry
            .call_with_cancel(
                || async { Err::<(), _>(io::Error::other("still failing")) },
                &child,
            )
            .await
    });

    tokio::time::sleep(Duration::from_secs(7)).await;
    token.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 2);
}

// =============================================================================
// Outcome Boundary Tests
// =============================================================================

fn parse_port(raw: &str) -> Outcome<u16, String> {
    to_outcome(|| raw.trim().parse::<u16>())
        .map_failure(|e| format!("invalid port {:?}: {}", raw, e))
        .try_map_success(|port| {
            if port == 0 {
                Err("port must be non-zero".to_string())
            } else {
                Ok(port)
            }
        })
}

fn listen_address(host: &str, raw_port: &str) -> Result<String, String> {
    let port = parse_port(raw_port).into_result()?;
    Ok(format!("{}:{}", host, port))
}

#[test]
fn test_outcome_crosses_into_result_code() {
    assert_eq!(listen_address("localhost", " 8080 ").unwrap(), "localhost:8080");
    assert_eq!(
        listen_address("localhost", "0").unwrap_err(),
        "port must be non-zero"
    );
    assert!(
        listen_address("localhost", "http")
            .unwrap_err()
            .starts_with("invalid port")
    );
}

#[tokio::test]
async fn test_outcome_wraps_resilient_call() {
    let circuit = CircuitBreaker::default_circuit();
    circuit.force_open();

    let outcome = Outcome::of_async(|| circuit.call(|| async { Ok::<_, io::Error>(1) })).await;
    assert!(outcome.is_failure());
    assert!(outcome.as_ref().failure().is_some_and(|e| e.is_open()));
    assert_eq!(outcome.map_success(|v| v + 1).unwrap_or(0), 0);
}

// =============================================================================
// Fallback Tests
// =============================================================================

#[tokio::test]
async fn test_fallback_after_exhausted_retries() {
    let fallback = fallback_value::<&str, RetryError<io::Error>>("stale-quote")
        .with_name("quotes")
        .only_if(RetryError::is_exhausted);
    let retry = Retry::new(RetryPolicy::immediate(2)).with_sleeper(InstantSleeper);
    let retry = &retry;

    let quote = fallback
        .call(move || async move {
            retry
                .call(|| async { Err::<&str, _>(io::Error::other("quote feed down")) })
                .await
        })
        .await;

    assert_eq!(quote.success(), Some("stale-quote"));
}

#[tokio::test]
async fn test_fallback_serves_open_circuit_through_outcome() {
    let circuit = CircuitBreaker::new(CircuitBreakerConfig::new("pricing"));
    circuit.force_open();

    let menu = fallback_with(|e: &CircuitBreakerError<io::Error>| {
        if e.is_open() { "static menu" } else { "error page" }
    });

    let served = menu
        .call(|| circuit.call(|| async { Ok::<_, io::Error>("live menu") }))
        .await;

    assert_eq!(served.unwrap_or("nothing"), "static menu");
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[cfg(feature = "config")]
#[tokio::test]
async fn test_settings_drive_policies() {
    use bulwark::bulwark_config::{EnvLoader, FileFormat, ResilienceSettings, Validate};

    let mut settings = ResilienceSettings::parse(
        r#"
            [retry]
            max_attempts = 3
            base_delay_ms = 20
            backoff_multiplier = 3.0

            [breakers.billing]
            failure_threshold = 2
            cooldown_ms = 5000
        "#,
        FileFormat::Toml,
    )
    .unwrap();
    settings
        .apply_env(&EnvLoader::from_vars(
            "BULWARK",
            [("BULWARK_BREAKER_BILLING_FAILURE_THRESHOLD", "1")],
        ))
        .unwrap();
    settings.validate().unwrap();

    let sleeper = RecordingSleeper::new();
    let retry = Retry::new(settings.retry_policy()).with_sleeper(sleeper.clone());
    let circuit = CircuitBreaker::new(settings.breaker("billing"));
    let breaker = &circuit;

    let err = retry
        .call(move || breaker.call(|| async { Err::<(), _>(io::Error::other("declined")) }))
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 3);
    assert_eq!(circuit.state(), CircuitState::Open);
    assert_eq!(circuit.total_rejections(), 2);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(20), Duration::from_millis(60)]
    );
}

// =============================================================================
// Logging Tests
// =============================================================================

#[cfg(feature = "log")]
#[test]
fn test_log_render_is_structured() {
    use bulwark::bulwark_log::{Format, Level, LogConfig};

    let config = LogConfig::from_lookup(|key| match key {
        "BULWARK_LOG_FORMAT" => Some("json".to_string()),
        "BULWARK_LOG_TIMESTAMPS" => Some("false".to_string()),
        _ => None,
    });
    assert_eq!(config.format, Format::Json);

    let line = bulwark::bulwark_log::render(Level::Warn, "bulwark::retry", "giving up", &config);
    assert!(line.contains("\"level\":\"WARN\""));
    assert!(line.contains("\"message\":\"giving up\""));
    assert!(!line.contains("timestamp"));
}
