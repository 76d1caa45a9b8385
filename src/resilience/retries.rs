//! Retry logic.
//!
//! # Responsibilities
//! - Re-run an async operation when its error is transient
//! - Wait a jittered backoff between attempts
//!
//! # Design Decisions
//! - The caller decides what is transient through a predicate
//! - Attempts are bounded; the last error is returned unchanged

use std::future::Future;

use crate::resilience::backoff::BackoffPolicy;

/// Run `op`, retrying up to `retries` extra times while `is_transient`
/// holds for the error.
pub async fn with_retry<T, E, F, Fut, P>(
    retries: u32,
    policy: BackoffPolicy,
    is_transient: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && is_transient(&e) => {
                attempt += 1;
                let delay = policy.delay(attempt);
                tracing::debug!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(1),
            max: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = with_retry(1, fast(), |_| true, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err("flaky".to_string())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_retry(3, fast(), |_| false, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("fatal".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_retry(1, fast(), |_| true, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;
        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
