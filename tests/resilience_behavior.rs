//! Behavior-driven tests for the resilience layer
//!
//! These tests verify HOW retries, the circuit breaker, the rate limiter and
//! the response cache behave, end to end through the aggregator where it
//! matters. Time is always the paused tokio clock.

mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use propdata_core::{
    AggregationOptions, CircuitBreaker, CircuitBreakerConfig, CircuitState, HttpError,
    RateLimitConfig, RateLimiter, ResponseCache, RetryConfig, RetryPolicy, ServiceError,
    ServiceErrorKind, ServiceId,
};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use support::{builder_for, endpoint, route_healthy_property, Scripted, ScriptedHttpClient};

const ADDRESS: &str = "1 Main St, Springfield";

fn policy(config: RetryConfig) -> RetryPolicy {
    RetryPolicy::new(
        config,
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
    )
}

fn error_code<'a>(
    record: &'a propdata_core::AggregatedRecord,
    service: ServiceId,
) -> Option<&'a str> {
    record.failure_for(service).map(|failure| failure.code.as_str())
}

// =============================================================================
// Retry: Backoff and Terminal Errors
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_service_fails_twice_then_recovers_retry_waits_one_then_two_seconds() {
    // Given: An operation that fails twice with 503 before succeeding
    let policy = policy(RetryConfig::default());
    let attempts = AtomicU32::new(0);
    let started = Instant::now();
    let seen_at = Mutex::new(Vec::new());

    // When: The retry policy runs it
    let result = policy
        .execute(ServiceId::Listings, &CancellationToken::new(), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            seen_at
                .lock()
                .expect("timestamps should not be poisoned")
                .push(started.elapsed());
            async move {
                if attempt < 2 {
                    Err(ServiceError::from_status(ServiceId::Listings, 503, ""))
                } else {
                    Ok("answer")
                }
            }
        })
        .await;

    // Then: Three invocations, spaced 1s then 2s apart
    assert_eq!(result, Ok("answer"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let seen_at = seen_at.into_inner().expect("timestamps should not be poisoned");
    assert_eq!(
        seen_at,
        vec![
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(3)
        ]
    );
    assert_eq!(
        policy.breaker().consecutive_failures(ServiceId::Listings),
        0,
        "success resets the failure count"
    );
}

#[tokio::test(start_paused = true)]
async fn when_service_answers_not_found_retry_gives_up_immediately() {
    // Given: An operation that always returns 404
    let policy = policy(RetryConfig::default());
    let attempts = AtomicU32::new(0);

    // When: The retry policy runs it
    let result: Result<(), ServiceError> = policy
        .execute(ServiceId::Valuation, &CancellationToken::new(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::from_status(ServiceId::Valuation, 404, "")) }
        })
        .await;

    // Then: Exactly one invocation, and the breaker is untouched
    let error = result.expect_err("404 is terminal");
    assert_eq!(error.kind(), ServiceErrorKind::NotFound);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        policy.breaker().consecutive_failures(ServiceId::Valuation),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn when_transport_keeps_timing_out_system_stops_after_max_retries() {
    // Given: Listings times out on every attempt
    let http = ScriptedHttpClient::new();
    http.route(
        endpoint(ServiceId::Listings, "/properties"),
        vec![Scripted::Fail(HttpError::timeout("read timed out"))],
    );
    route_healthy_property(&http, ADDRESS);
    let aggregator = builder_for(Arc::clone(&http))
        .build()
        .expect("aggregator builds");

    // When: A property query runs
    let record = aggregator
        .get_property_data(ADDRESS, &AggregationOptions::default())
        .await
        .expect("valid address");

    // Then: Listings was tried four times and reported as a timeout
    assert_eq!(
        http.calls_to(&endpoint(ServiceId::Listings, "/properties")),
        4
    );
    let failure = record
        .failure_for(ServiceId::Listings)
        .expect("listings failure recorded");
    assert_eq!(failure.code, "TIMEOUT");
    assert!(failure.retryable);
}

// =============================================================================
// Circuit Breaker
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_failures_reach_threshold_circuit_opens_and_fails_fast() {
    // Given: Listings always answers 503; retries disabled; threshold 2
    let http = ScriptedHttpClient::new();
    http.route(
        endpoint(ServiceId::Listings, "/properties"),
        vec![Scripted::status(503)],
    );
    let reset_timeout = Duration::from_secs(60);
    let aggregator = builder_for(Arc::clone(&http))
        .with_retry_config(RetryConfig::no_retry())
        .with_circuit_breaker_config(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout,
        })
        .build()
        .expect("aggregator builds");
    let options = AggregationOptions::default();
    let listings = endpoint(ServiceId::Listings, "/properties");

    // When: Two queries fail and a third is attempted
    for _ in 0..2 {
        let record = aggregator
            .get_property_data(ADDRESS, &options)
            .await
            .expect("valid address");
        assert_eq!(error_code(&record, ServiceId::Listings), Some("SERVER_ERROR"));
    }
    let record = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: The third call is refused locally without touching the transport
    assert_eq!(error_code(&record, ServiceId::Listings), Some("CIRCUIT_OPEN"));
    assert_eq!(http.calls_to(&listings), 2);
    assert_eq!(
        aggregator.breaker().state(ServiceId::Listings),
        CircuitState::Open
    );

    // And: 404s from other services never moved their breakers
    assert_eq!(
        aggregator.breaker().state(ServiceId::PublicRecords),
        CircuitState::Closed
    );

    let status = aggregator
        .service_status()
        .into_iter()
        .find(|status| status.service == ServiceId::Listings)
        .expect("listings status");
    assert_eq!(status.circuit_state, CircuitState::Open);
    assert!(status.retry_in_ms.is_some_and(|ms| ms <= 60_000));
}

#[tokio::test(start_paused = true)]
async fn when_reset_timeout_elapses_one_probe_closes_the_circuit() {
    // Given: A circuit opened by two 503s, after which listings recovers
    let http = ScriptedHttpClient::new();
    http.route(
        endpoint(ServiceId::Listings, "/properties"),
        vec![
            Scripted::status(503),
            Scripted::status(503),
            Scripted::json(support::listing_json(ADDRESS, 500_000.0)),
        ],
    );
    let aggregator = builder_for(Arc::clone(&http))
        .with_retry_config(RetryConfig::no_retry())
        .with_circuit_breaker_config(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        })
        .build()
        .expect("aggregator builds");
    let options = AggregationOptions::default();
    for _ in 0..2 {
        aggregator
            .get_property_data(ADDRESS, &options)
            .await
            .expect("valid address");
    }
    assert_eq!(
        aggregator.breaker().state(ServiceId::Listings),
        CircuitState::Open
    );

    // When: The reset timeout passes and another query runs
    tokio::time::advance(Duration::from_secs(61)).await;
    let record = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: The probe succeeds and the circuit is closed again
    assert!(record.sources.contains(&ServiceId::Listings));
    assert_eq!(
        aggregator.breaker().state(ServiceId::Listings),
        CircuitState::Closed
    );
    assert_eq!(
        aggregator.breaker().consecutive_failures(ServiceId::Listings),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn when_a_call_admitted_while_closed_is_cancelled_half_open_stays_single_call() {
    // Given: A call admitted while the circuit was closed that never answers
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout: Duration::from_secs(60),
    }));
    let policy = RetryPolicy::new(RetryConfig::no_retry(), Arc::clone(&breaker));
    let cancel = CancellationToken::new();
    let stalled = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            policy
                .execute(ServiceId::Listings, &cancel, || {
                    std::future::pending::<Result<(), ServiceError>>()
                })
                .await
        })
    };
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    // And: Another call fails, the circuit opens, and after the reset timeout
    // a second call takes the single half-open probe
    breaker.record_failure(ServiceId::Listings);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(breaker.can_make_request(ServiceId::Listings));

    // When: The stalled call is cancelled
    cancel.cancel();
    let outcome = stalled.await.expect("stalled call joins");

    // Then: It reports CANCELLED and does not hand out a second probe
    assert_eq!(
        outcome.expect_err("cancelled").kind(),
        ServiceErrorKind::Cancelled
    );
    assert!(!breaker.can_make_request(ServiceId::Listings));
    assert_eq!(breaker.state(ServiceId::Listings), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn when_half_open_call_finds_no_record_the_circuit_closes() {
    // Given: Valuation opened its circuit with a 503 and now answers with an
    // empty valuation
    let http = ScriptedHttpClient::new();
    let avm = endpoint(ServiceId::Valuation, "/avm");
    http.route(
        avm.clone(),
        vec![Scripted::status(503), Scripted::json(json!({}))],
    );
    route_healthy_property(&http, ADDRESS);
    let aggregator = builder_for(Arc::clone(&http))
        .with_retry_config(RetryConfig::no_retry())
        .with_circuit_breaker_config(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        })
        .build()
        .expect("aggregator builds");
    let options = AggregationOptions::default();
    aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");
    assert_eq!(
        aggregator.breaker().state(ServiceId::Valuation),
        CircuitState::Open
    );

    // When: The reset timeout passes and the probe gets the empty answer
    tokio::time::advance(Duration::from_secs(61)).await;
    let record = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: NOT_FOUND proves the service is reachable, so the circuit closes
    assert_eq!(error_code(&record, ServiceId::Valuation), Some("NOT_FOUND"));
    assert_eq!(http.calls_to(&avm), 2);
    assert_eq!(
        aggregator.breaker().state(ServiceId::Valuation),
        CircuitState::Closed
    );
}

// =============================================================================
// Rate Limiting
// =============================================================================

#[test]
fn when_per_minute_budget_is_sixty_the_sixty_first_request_is_denied() {
    // Given: A limiter with perMinute = 60
    let limiter = RateLimiter::new();
    let config = RateLimitConfig::per_minute(60);

    // When: 61 requests arrive within the minute
    let admitted = (0..61)
        .filter(|_| limiter.can_proceed(ServiceId::Demographics, &config))
        .count();

    // Then: Exactly 60 are admitted and slack is exhausted
    assert_eq!(admitted, 60);
    assert_eq!(
        limiter
            .remaining(ServiceId::Demographics, &config)
            .per_minute,
        Some(0)
    );
    assert!(limiter.can_proceed(ServiceId::Listings, &config));
}

#[tokio::test(start_paused = true)]
async fn when_rate_limit_is_exhausted_request_fails_without_transport_call() {
    // Given: Listings allows one request per minute
    let http = ScriptedHttpClient::new();
    route_healthy_property(&http, ADDRESS);
    let aggregator = builder_for(Arc::clone(&http))
        .with_rate_limit(ServiceId::Listings, RateLimitConfig::per_minute(1))
        .build()
        .expect("aggregator builds");
    let options = AggregationOptions::default();

    // When: Two queries run back to back
    let first = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");
    let second = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: The second is denied locally, is not retried and is terminal
    assert!(first.sources.contains(&ServiceId::Listings));
    let failure = second
        .failure_for(ServiceId::Listings)
        .expect("listings denied");
    assert_eq!(failure.code, "RATE_LIMIT_EXCEEDED");
    assert!(!failure.retryable);
    assert_eq!(
        http.calls_to(&endpoint(ServiceId::Listings, "/properties")),
        1
    );
    assert_eq!(
        aggregator.breaker().state(ServiceId::Listings),
        CircuitState::Closed
    );
}

// =============================================================================
// Response Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_ttl_is_300_seconds_entry_hits_at_299_and_misses_at_301() {
    // Given: An entry stored with a 300 s TTL
    let cache = ResponseCache::new();
    cache
        .set(String::from("key"), json!({"v": 1}), Duration::from_secs(300))
        .await;

    // When / Then: It is served at 299 s and gone at 301 s
    tokio::time::advance(Duration::from_secs(299)).await;
    assert_eq!(cache.get("key").await, Some(json!({"v": 1})));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get("key").await, None);
    assert!(cache.is_empty().await, "expired entry is evicted on read");
}

#[tokio::test(start_paused = true)]
async fn when_same_property_is_queried_twice_upstream_is_called_once() {
    // Given: Healthy services
    let http = ScriptedHttpClient::new();
    route_healthy_property(&http, ADDRESS);
    let aggregator = builder_for(Arc::clone(&http))
        .build()
        .expect("aggregator builds");
    let options = AggregationOptions::default();

    // When: The same address is queried twice
    let first = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");
    let second = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: The second answer comes from the cache with identical values
    assert_eq!(http.total_calls(), 3);
    assert_eq!(first.fields, second.fields);
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test(start_paused = true)]
async fn when_upstream_fails_nothing_is_cached() {
    // Given: Valuation fails once with 400, then answers
    let http = ScriptedHttpClient::new();
    http.route(
        endpoint(ServiceId::Valuation, "/avm"),
        vec![
            Scripted::status(400),
            Scripted::json(support::avm_json(510_000.0)),
        ],
    );
    route_healthy_property(&http, ADDRESS);
    let aggregator = builder_for(Arc::clone(&http))
        .build()
        .expect("aggregator builds");
    let options = AggregationOptions::default();

    // When: Two queries run
    let first = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");
    let second = aggregator
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: The failure was not cached; the second query reached valuation
    assert_eq!(error_code(&first, ServiceId::Valuation), Some("API_ERROR"));
    assert!(second.sources.contains(&ServiceId::Valuation));
    assert_eq!(http.calls_to(&endpoint(ServiceId::Valuation, "/avm")), 2);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_caller_cancels_during_backoff_retry_loop_stops_promptly() {
    // Given: An operation that always fails with 503 and a token cancelled
    // halfway through the first backoff
    let policy = policy(RetryConfig::default());
    let attempts = AtomicU32::new(0);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });
    let started = Instant::now();

    // When: The retry policy runs
    let result: Result<(), ServiceError> = policy
        .execute(ServiceId::Listings, &cancel, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::from_status(ServiceId::Listings, 503, "")) }
        })
        .await;

    // Then: It stops with CANCELLED after one attempt, without waiting out
    // the backoff
    assert_eq!(
        result.expect_err("cancelled").kind(),
        ServiceErrorKind::Cancelled
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn when_caller_token_is_already_cancelled_no_request_is_sent() {
    // Given: A pre-cancelled caller token
    let http = ScriptedHttpClient::new();
    route_healthy_property(&http, ADDRESS);
    let aggregator = builder_for(Arc::clone(&http))
        .build()
        .expect("aggregator builds");
    let cancel = CancellationToken::new();
    cancel.cancel();

    // When: A property query runs with it
    let record = aggregator
        .get_property_data(
            ADDRESS,
            &AggregationOptions::default().with_cancel(cancel),
        )
        .await
        .expect("valid address");

    // Then: Nothing reached the transport and every provider reports CANCELLED
    assert_eq!(http.total_calls(), 0);
    assert_eq!(record.errors.len(), 3);
    assert!(record.errors.iter().all(|failure| failure.code == "CANCELLED"));
    assert!(record.sources.is_empty());
}

// =============================================================================
// Shared State
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_aggregators_share_a_breaker_failures_through_one_open_it_for_the_other() {
    // Given: Two aggregators built over one limiter, breaker and cache, and
    // a listings service that always answers 503
    let http = ScriptedHttpClient::new();
    let listings = endpoint(ServiceId::Listings, "/properties");
    http.route(listings.clone(), vec![Scripted::status(503)]);
    route_healthy_property(&http, ADDRESS);
    let limiter = Arc::new(RateLimiter::new());
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        reset_timeout: Duration::from_secs(60),
    }));
    let cache = ResponseCache::new();
    let build = || {
        builder_for(Arc::clone(&http))
            .with_retry_config(RetryConfig::no_retry())
            .with_shared_state(Arc::clone(&limiter), Arc::clone(&breaker), cache.clone())
            .build()
            .expect("aggregator builds")
    };
    let first = build();
    let second = build();
    let options = AggregationOptions::default();

    // When: The first aggregator sees two failures
    for _ in 0..2 {
        first
            .get_property_data(ADDRESS, &options)
            .await
            .expect("valid address");
    }
    let record = second
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: The second aggregator fails fast on the same open circuit
    assert_eq!(error_code(&record, ServiceId::Listings), Some("CIRCUIT_OPEN"));
    assert_eq!(http.calls_to(&listings), 2);
    assert_eq!(
        second.breaker().state(ServiceId::Listings),
        CircuitState::Open
    );
}

#[tokio::test(start_paused = true)]
async fn when_aggregators_share_a_cache_one_fill_serves_both() {
    // Given: Two aggregators built over one limiter, breaker and cache
    let http = ScriptedHttpClient::new();
    route_healthy_property(&http, ADDRESS);
    let limiter = Arc::new(RateLimiter::new());
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let cache = ResponseCache::new();
    let build = || {
        builder_for(Arc::clone(&http))
            .with_shared_state(Arc::clone(&limiter), Arc::clone(&breaker), cache.clone())
            .build()
            .expect("aggregator builds")
    };
    let first = build();
    let second = build();
    let options = AggregationOptions::default();

    // When: Each aggregator queries the same address once
    let filled = first
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");
    let served = second
        .get_property_data(ADDRESS, &options)
        .await
        .expect("valid address");

    // Then: Only the first reached upstream; the second got identical values
    assert_eq!(http.total_calls(), 3);
    assert_eq!(filled.fields, served.fields);
    assert_eq!(served.sources, filled.sources);
    assert!(!cache.is_empty().await);
}
