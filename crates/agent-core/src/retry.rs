//! Retry policy for transient LLM-provider failures (§4.12).
//!
//! Only `AgentError::LlmTransient` triggers a retry; everything else is
//! returned to the caller immediately. Cancellation short-circuits retries.

use std::time::Duration;

use crate::error::AgentError;

/// `{max_retries, initial_delay, max_delay, exponential_base, jitter}` from §4.12.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Fractional jitter applied as `delay * (1 ± jitter)`, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `attempt` (0-indexed), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay with jitter applied; `jitter_unit` must be in `[-1.0, 1.0]` (caller supplies
    /// randomness so this function stays deterministic and test-friendly).
    pub fn delay_with_jitter(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let factor = 1.0 + jitter_unit.clamp(-1.0, 1.0) * self.jitter;
        Duration::from_secs_f64((base * factor).max(0.0))
    }
}

/// Classifies an HTTP-style status code into transient vs permanent (§6).
///
/// 408, 429, and 5xx are transient; other `>= 400` codes are permanent.
pub fn classify_status(status: u16, message: impl Into<String>) -> AgentError {
    let message = message.into();
    if status == 408 || status == 429 || (500..600).contains(&status) {
        AgentError::LlmTransient(message)
    } else {
        AgentError::LlmPermanent(message)
    }
}

/// Runs `f` with the retry policy applied; retries only on `LlmTransient`.
///
/// `f` is called at least once. Between attempts, `sleep` is invoked with the
/// computed delay so callers can plug in a real async sleep; `jitter_unit`
/// supplies the jitter sample for each attempt.
pub async fn retry_async<T, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    mut jitter_unit: impl FnMut() -> f64,
    mut f: F,
    mut sleep: S,
) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AgentError>>,
    S: FnMut(Duration) -> SFut,
    SFut: std::future::Future<Output = ()>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) if e.is_retriable() && attempt < policy.max_retries => {
                let delay = policy.delay_with_jitter(attempt, jitter_unit());
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_matches_spec_boundaries() {
        assert!(matches!(classify_status(408, "t"), AgentError::LlmTransient(_)));
        assert!(matches!(classify_status(429, "t"), AgentError::LlmTransient(_)));
        assert!(matches!(classify_status(500, "t"), AgentError::LlmTransient(_)));
        assert!(matches!(classify_status(599, "t"), AgentError::LlmTransient(_)));
        assert!(matches!(classify_status(400, "t"), AgentError::LlmPermanent(_)));
        assert!(matches!(classify_status(404, "t"), AgentError::LlmPermanent(_)));
    }

    #[test]
    fn base_delay_grows_exponentially_then_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(450),
            exponential_base: 2.0,
            jitter: 0.0,
        };
        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(2), Duration::from_millis(400));
        assert_eq!(policy.base_delay(3), Duration::from_millis(450)); // capped
    }

    #[test]
    fn jitter_is_bounded_by_configured_fraction() {
        let policy = RetryPolicy {
            jitter: 0.1,
            ..RetryPolicy::default()
        };
        let base = policy.base_delay(0).as_secs_f64();
        let high = policy.delay_with_jitter(0, 1.0).as_secs_f64();
        let low = policy.delay_with_jitter(0, -1.0).as_secs_f64();
        assert!((high - base * 1.1).abs() < 1e-9);
        assert!((low - base * 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn retry_async_retries_only_transient_and_stops_at_cap() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            exponential_base: 1.0,
            jitter: 0.0,
        };
        let mut calls = 0;
        let result: Result<i32, AgentError> = retry_async(
            &policy,
            || 0.0,
            || {
                calls += 1;
                async move { Err::<i32, _>(AgentError::LlmTransient("x".into())) }
            },
            |_d| async move {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn retry_async_does_not_retry_permanent_errors() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: Result<i32, AgentError> = retry_async(
            &policy,
            || 0.0,
            || {
                calls += 1;
                async move { Err::<i32, _>(AgentError::LlmPermanent("400".into())) }
            },
            |_d| async move {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_async_succeeds_after_transient_failure() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            exponential_base: 1.0,
            jitter: 0.0,
        };
        let mut calls = 0;
        let result = retry_async(
            &policy,
            || 0.0,
            || {
                calls += 1;
                async move {
                    if calls < 2 {
                        Err(AgentError::LlmTransient("x".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
            |_d| async move {},
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }
}
