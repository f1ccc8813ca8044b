// ABOUTME: Provider module aggregating LLM adapters and their shared retry policy.
// ABOUTME: Each sub-module implements ModelClient for a specific LLM API.

pub mod gemini;

use std::future::Future;
use std::time::Duration;

use crate::runtime::AgentError;

/// Run `op` until it succeeds, fails permanently, or has been retried
/// `max_retries` times. Only transient errors are retried; the delay starts
/// at `base_delay` and doubles on each further attempt. An exhausted budget
/// surfaces as `ModelRequestFailed`.
pub async fn with_retries<T, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, AgentError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient model error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                return Err(AgentError::ModelRequestFailed(format!(
                    "{} (gave up after {} attempts)",
                    e,
                    attempt + 1
                )));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retries(2, Duration::from_millis(1), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AgentError::RateLimited)
                } else {
                    Ok("answer")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), AgentError> = with_retries(2, Duration::from_millis(1), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(AgentError::Transient("503 Service Unavailable".to_string())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3, "one attempt plus two retries");
        match result {
            Err(AgentError::ModelRequestFailed(msg)) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("3 attempts"));
            }
            other => panic!("expected ModelRequestFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), AgentError> = with_retries(2, Duration::from_millis(1), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(AgentError::ModelRequestFailed("401 Unauthorized".to_string())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AgentError::ModelRequestFailed(_))));
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), AgentError> = with_retries(0, Duration::from_millis(1), move |attempt| {
            assert_eq!(attempt, 0);
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(AgentError::RateLimited) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AgentError::ModelRequestFailed(_))));
    }
}
