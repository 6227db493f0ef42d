//! Exponential backoff with jitter for the retry policy spec §4.1 defines for
//! transient provider failures: 3 attempts, 250 ms base, doubling, ±25%
//! jitter. Shared by the embedding client (C1) and the document ingestor's
//! chunk-persistence retries (C3).

use rand::Rng;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

pub const DEFAULT_ATTEMPTS: usize = 3;
pub const DEFAULT_BASE: Duration = Duration::from_millis(250);

fn jittered(base: Duration, attempt: u32) -> Duration {
    let factor = 2u64.pow(attempt);
    let nominal = base.as_millis() as u64 * factor;
    let jitter_frac = rand::rng().random_range(-0.25..=0.25);
    let jittered_ms = (nominal as f64 * (1.0 + jitter_frac)).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}

/// Runs `op` up to `attempts` times. Retries on `OrchestratorError::ProviderTransient`
/// and `OrchestratorError::StoreUnreachable` (both are expected to clear up on
/// their own — a flaky provider or a momentarily unreachable connection pool);
/// any other error (or the last transient failure) is returned immediately.
pub async fn retry_transient<F, Fut, T>(attempts: usize, base: Duration, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e @ (OrchestratorError::ProviderTransient(_) | OrchestratorError::StoreUnreachable(_))) => {
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(jittered(base, attempt as u32)).await;
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err.unwrap_or_else(|| OrchestratorError::ProviderTransient("retries exhausted".into())).log())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = retry_transient(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(OrchestratorError::ProviderTransient("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_exhausting_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_transient(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OrchestratorError::ProviderTransient("always fails".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_transient(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OrchestratorError::ProviderPermanent("bad request".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
