//! Retry policy for upstream requests
//!
//! The policy itself is a pure decision function; [`execute_with_retry`]
//! composes it around a request so every logical request keeps its own
//! attempt counter.

use crate::{
    constants::{INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRY_ATTEMPTS},
    error::ProviderError,
};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the given delay, then try again
    RetryAfter(Duration),
    /// Stop and surface the error
    GiveUp,
}

/// Bounded exponential backoff with optional full jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the original attempt
    pub max_retries: u32,
    /// Delay ceiling before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Pick a random delay in `[0, ceiling]` instead of the ceiling itself
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retries without any delay between attempts
    pub fn immediate() -> Self {
        Self {
            max_retries: MAX_RETRY_ATTEMPTS,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    /// Never retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::immediate()
        }
    }

    /// Decides whether attempt number `attempt` (1-based) should be followed
    /// by another one
    pub fn decide(&self, attempt: u32, error: &ProviderError) -> RetryDecision {
        if !error.is_transient() || attempt > self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt))
    }

    /// Deterministic delay ceiling after attempt number `attempt`
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let ceiling_ms = ceiling.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(0..=ceiling_ms))
    }
}

/// Result of a retried request along with how many retries it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ProviderError>,
    pub retries: u32,
}

/// Runs `op` until it succeeds or `policy` gives up
///
/// `op` receives the 1-based attempt number. Attempts are strictly
/// sequential: attempt N+1 starts only after attempt N has failed and the
/// backoff delay has elapsed.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    request_id: Uuid,
    label: &str,
    mut op: F,
) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    retries: attempt - 1,
                }
            }
            Err(e) => match policy.decide(attempt, &e) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        %request_id,
                        request = label,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    return Attempted {
                        result: Err(e),
                        retries: attempt - 1,
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_retries_transient_errors_up_to_ceiling() {
        let policy = RetryPolicy::immediate();
        let err = ProviderError::Timeout;

        for attempt in 1..=3 {
            assert_eq!(
                policy.decide(attempt, &err),
                RetryDecision::RetryAfter(Duration::ZERO)
            );
        }
        assert_eq!(policy.decide(4, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn test_decide_gives_up_on_permanent_errors() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, &ProviderError::status(404, "not found")),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(1, &ProviderError::setup("relative URL without a base")),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_backoff_ceiling_doubles_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_ceiling(3), Duration::from_millis(1000));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(2000));
        assert_eq!(policy.backoff_ceiling(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_jittered_delay_within_ceiling() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            match policy.decide(2, &ProviderError::Timeout) {
                RetryDecision::RetryAfter(delay) => {
                    assert!(delay <= Duration::from_millis(500))
                }
                RetryDecision::GiveUp => panic!("expected a retry"),
            }
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_fourth_attempt() {
        let outcome = execute_with_retry(
            &RetryPolicy::immediate(),
            Uuid::new_v4(),
            "test",
            |attempt| async move {
                if attempt <= 3 {
                    Err(ProviderError::Timeout)
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;

        assert_eq!(outcome.result, Ok(4));
        assert_eq!(outcome.retries, 3);
    }

    #[tokio::test]
    async fn test_fails_after_four_attempts() {
        let outcome: Attempted<()> = execute_with_retry(
            &RetryPolicy::immediate(),
            Uuid::new_v4(),
            "test",
            |_| async { Err(ProviderError::NoResponse("connection reset".into())) },
        )
        .await;

        assert!(matches!(outcome.result, Err(ProviderError::NoResponse(_))));
        assert_eq!(outcome.retries, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let outcome: Attempted<()> = execute_with_retry(
            &RetryPolicy::immediate(),
            Uuid::new_v4(),
            "test",
            |_| async { Err(ProviderError::status(400, "bad request")) },
        )
        .await;

        assert_eq!(outcome.retries, 0);
        assert_eq!(outcome.result, Err(ProviderError::status(400, "bad request")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        let start = tokio::time::Instant::now();

        let outcome = execute_with_retry(&policy, Uuid::new_v4(), "test", |attempt| async move {
            if attempt < 4 {
                Err(ProviderError::status(503, "unavailable"))
            } else {
                Ok(())
            }
        })
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_millis(250 + 500 + 1000));
    }
}
