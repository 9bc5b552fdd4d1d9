//! Retry-with-exponential-backoff combinator.
//!
//! [`with_retry`] wraps any fallible async operation. It keeps no state between
//! invocations and knows nothing about HTTP; the HTTP-specific classifier
//! [`is_retryable_http_error`] is provided separately for callers that want to
//! restrict retries with [`with_retry_if`].

use std::fmt;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error, warn};

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default ceiling applied to a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Attempt budget and delay curve for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one. `0` means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every later retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay. `None` lets the curve grow unbounded.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Some(DEFAULT_MAX_DELAY),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay slept before retry number `attempt` (1-based), after the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = backoff_delay(self.base_delay, attempt);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Uncapped exponential delay: `base * 2^(attempt - 1)` for `attempt >= 1`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.max(1).saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Failure returned once the retry budget is spent.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Name of the wrapped operation, as passed to the combinator.
    pub operation: String,
    /// How many attempts were made, including the first one.
    pub attempts: u32,
    /// Error produced by the final attempt.
    pub last_error: E,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        self.last_error
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.attempts == 1 { "" } else { "s" };
        write!(
            f,
            "{} failed after {} attempt{plural}: {}",
            self.operation, self.attempts, self.last_error
        )
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Run `op`, retrying every failure with exponential backoff.
pub async fn with_retry<T, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + fmt::Debug,
{
    with_retry_if(operation, policy, |_| true, op).await
}

/// Run `op`, retrying only failures accepted by `should_retry`.
///
/// Rejected failures propagate immediately with the attempt count so far.
pub async fn with_retry_if<T, E, F, Fut, P>(
    operation: &str,
    policy: &RetryPolicy,
    mut should_retry: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: fmt::Display + fmt::Debug,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let failure = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempts = attempt, "operation recovered after retry");
                }
                return Ok(value);
            }
            Err(failure) => failure,
        };

        let retryable = should_retry(&failure);
        if retryable && attempt <= policy.max_retries {
            let delay = policy.delay_for(attempt);
            warn!(
                operation,
                attempt,
                max_retries = policy.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "operation failed; retrying after backoff"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        if retryable {
            error!(
                operation,
                attempts = attempt,
                error = %failure,
                trace = ?failure,
                "operation failed persistently; retries exhausted"
            );
        } else {
            error!(
                operation,
                attempts = attempt,
                error = %failure,
                trace = ?failure,
                "operation failed with a non-retryable error"
            );
        }

        return Err(RetryError {
            operation: operation.to_owned(),
            attempts: attempt,
            last_error: failure,
        });
    }
}

fn retryable_status_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?(refused|reset)|timed?.?out")
            .expect("retry regex must compile")
    })
}

/// Error text retry policy for transient failures and retryable statuses.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504) || retryable_status_regex().is_match(error_text)
}
