use std::cell::RefCell;
use std::time::Duration;

use assistant_api::retry::*;
use tokio::time::Instant;

#[test]
fn retry_http_status_is_retryable() {
    assert!(is_retryable_http_error(429, ""));
    assert!(is_retryable_http_error(500, ""));
    assert!(is_retryable_http_error(502, ""));
    assert!(is_retryable_http_error(503, ""));
    assert!(is_retryable_http_error(504, ""));
    assert!(!is_retryable_http_error(400, "invalid model"));
}

#[test]
fn retry_http_error_pattern_is_retryable() {
    assert!(is_retryable_http_error(400, "rate limit exceeded"));
    assert!(is_retryable_http_error(400, "connection refused"));
    assert!(is_retryable_http_error(400, "operation timed out"));
}

#[test]
fn backoff_delay_doubles_from_base() {
    let base = Duration::from_millis(250);
    assert_eq!(backoff_delay(base, 1), Duration::from_millis(250));
    assert_eq!(backoff_delay(base, 2), Duration::from_millis(500));
    assert_eq!(backoff_delay(base, 3), Duration::from_millis(1000));
    assert_eq!(backoff_delay(base, 4), Duration::from_millis(2000));
}

#[test]
fn policy_cap_bounds_late_delays() {
    let policy = RetryPolicy::new(10, Duration::from_secs(1));
    assert_eq!(policy.delay_for(5), Duration::from_secs(16));
    assert_eq!(policy.delay_for(6), DEFAULT_MAX_DELAY);

    let uncapped = policy.with_max_delay(None);
    assert_eq!(uncapped.delay_for(8), Duration::from_secs(128));
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_attempts_exactly_max_retries_plus_one() {
    for max_retries in 0..=4 {
        let calls = RefCell::new(0u32);
        let policy = RetryPolicy::new(max_retries, Duration::from_millis(10));

        let result: Result<(), RetryError<String>> = with_retry("always_fails", &policy, || {
            *calls.borrow_mut() += 1;
            async { Err("boom".to_owned()) }
        })
        .await;

        let error = result.expect_err("operation never succeeds");
        assert_eq!(*calls.borrow(), max_retries + 1);
        assert_eq!(error.attempts, max_retries + 1);
        assert_eq!(error.operation, "always_fails");
        assert_eq!(error.last_error, "boom");
    }
}

#[tokio::test(start_paused = true)]
async fn zero_retries_propagates_immediately() {
    let start = Instant::now();
    let policy = RetryPolicy::new(0, Duration::from_secs(5));

    let result: Result<u8, RetryError<&str>> =
        with_retry("single_shot", &policy, || async { Err("nope") }).await;

    assert_eq!(result.expect_err("fails").attempts, 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn delays_between_attempts_grow_exponentially() {
    let attempts_at = RefCell::new(Vec::new());
    let policy = RetryPolicy::new(3, Duration::from_secs(1));

    let _: Result<(), RetryError<&str>> = with_retry("timed", &policy, || {
        attempts_at.borrow_mut().push(Instant::now());
        async { Err("transient") }
    })
    .await;

    let attempts_at = attempts_at.into_inner();
    let gaps: Vec<Duration> = attempts_at
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]))
        .collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn success_after_failures_returns_value() {
    let calls = RefCell::new(0u32);
    let policy = RetryPolicy::new(3, Duration::from_millis(100));

    let value = with_retry("flaky", &policy, || {
        *calls.borrow_mut() += 1;
        let current = *calls.borrow();
        async move {
            if current < 3 {
                Err(format!("attempt {current} failed"))
            } else {
                Ok(current * 10)
            }
        }
    })
    .await
    .expect("third attempt succeeds");

    assert_eq!(value, 30);
    assert_eq!(*calls.borrow(), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_if_stops_on_rejected_error() {
    let calls = RefCell::new(0u32);
    let policy = RetryPolicy::new(5, Duration::from_millis(10));

    let error = with_retry_if(
        "lookup",
        &policy,
        |error: &String| error != "not found",
        || {
            *calls.borrow_mut() += 1;
            async { Err::<(), _>("not found".to_owned()) }
        },
    )
    .await
    .expect_err("rejected errors propagate");

    assert_eq!(*calls.borrow(), 1);
    assert_eq!(error.attempts, 1);
}

#[test]
fn retry_error_display_carries_operation_and_attempts() {
    let error = RetryError {
        operation: "create_run".to_owned(),
        attempts: 3,
        last_error: "HTTP 503 overloaded",
    };
    assert_eq!(
        error.to_string(),
        "create_run failed after 3 attempts: HTTP 503 overloaded"
    );
}
