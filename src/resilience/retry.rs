use super::FixedWindowLimiter;
use crate::api::ApiOutcome;
use crate::error::ExchangeError;
use crate::settings::ResilienceSettings;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Errors that can tell whether repeating the call may succeed.
pub trait Retryable: Display {
    fn is_transient(&self) -> bool;
}

impl Retryable for ExchangeError {
    fn is_transient(&self) -> bool {
        ExchangeError::is_transient(self)
    }
}

/// Retry discipline for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` (counting from 0) sleeps `n * backoff` after failing.
    pub backoff: Duration,
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl From<&ResilienceSettings> for RetryPolicy {
    fn from(settings: &ResilienceSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff: settings.backoff(),
            deadline: settings.call_deadline(),
        }
    }
}

/// Runs exchange operations through the shared rate limiter, then retries
/// transient failures with linear backoff.
///
/// Cloning is cheap; all clones share one limiter.
#[derive(Clone)]
pub struct ResilientCaller {
    limiter: Arc<FixedWindowLimiter>,
    policy: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(limiter: Arc<FixedWindowLimiter>, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    pub fn from_settings(settings: &ResilienceSettings) -> Self {
        let limiter = FixedWindowLimiter::new(
            settings.rate_limit_calls,
            settings.rate_limit_period(),
        );
        Self::new(Arc::new(limiter), RetryPolicy::from(settings))
    }

    pub fn limiter(&self) -> &Arc<FixedWindowLimiter> {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `op` until it yields an outcome or attempts run out.
    ///
    /// Every attempt waits for the rate limiter first. `Err` values that are
    /// not transient become `PermanentError` immediately; exhausted retries and
    /// an expired deadline become `TransientError`.
    pub async fn call<T, E, F, Fut>(&self, operation: &str, op: F) -> ApiOutcome<T>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ApiOutcome<T>, E>>,
    {
        match self.policy.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.retry_loop(operation, op)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!(
                            operation,
                            deadline_secs = deadline.as_secs(),
                            "Call deadline exceeded, giving up"
                        );
                        ApiOutcome::TransientError(format!(
                            "{} exceeded deadline of {:?}",
                            operation, deadline
                        ))
                    }
                }
            }
            None => self.retry_loop(operation, op).await,
        }
    }

    async fn retry_loop<T, E, F, Fut>(&self, operation: &str, mut op: F) -> ApiOutcome<T>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ApiOutcome<T>, E>>,
    {
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            self.limiter.acquire().await;

            match op().await {
                Ok(outcome) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation,
                            retries = attempt,
                            "Recovered from network error"
                        );
                    }
                    return outcome;
                }
                Err(e) if e.is_transient() => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::error!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Network error, retrying"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(operation, error = %e, "Non-retryable error");
                    return ApiOutcome::PermanentError {
                        status: None,
                        message: e.to_string(),
                    };
                }
            }
        }

        tracing::info!(
            operation,
            attempts = self.policy.max_attempts,
            "Exhausted network retries"
        );
        ApiOutcome::TransientError(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("{} exhausted retries", operation)),
        )
    }
}
