use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::settings::LimitsConfig;
use crate::error::{OrchestratorError, Result};

/// Concurrency ceilings for the three provider/store call sites. These cap
/// how many in-flight requests this process makes at once; they do not
/// enforce a request *rate* (see `EmbeddingRateLimiter` for that).
#[derive(Clone)]
pub struct Limiters {
    pub embedding: Arc<Semaphore>,
    pub db_search: Arc<Semaphore>,
    pub llm_generate: Arc<Semaphore>,
    pub acquire_timeout: Duration,
}

impl Limiters {
    pub fn new(cfg: &LimitsConfig) -> Self {
        Self {
            embedding: Arc::new(Semaphore::new(cfg.embedding_concurrency.max(1))),
            db_search: Arc::new(Semaphore::new(cfg.db_search_concurrency.max(1))),
            llm_generate: Arc::new(Semaphore::new(cfg.llm_generate_concurrency.max(1))),
            acquire_timeout: Duration::from_millis(cfg.acquire_timeout_ms.max(1)),
        }
    }

    pub async fn acquire_timed(
        sem: Arc<Semaphore>,
        acquire_timeout: Duration,
        op: &'static str,
    ) -> Result<(OwnedSemaphorePermit, Duration)> {
        let start = Instant::now();

        let permit = tokio::time::timeout(acquire_timeout, sem.acquire_owned())
            .await
            .map_err(|_| {
                OrchestratorError::DeadlineExceeded(format!("limiter acquire timeout for op={op}"))
                    .log()
            })?
            .map_err(|_| {
                OrchestratorError::Invariant(format!("semaphore closed for op={op}")).log()
            })?;

        Ok((permit, start.elapsed()))
    }
}

/// Per-user token-bucket rate limiter on the embedding provider, per spec §5.
/// Distinct from `Limiters` above: this bounds request *rate*, not in-flight
/// concurrency. Buckets refill lazily from elapsed wall-clock time on each
/// `try_acquire` call — there is no background refill task.
pub struct EmbeddingRateLimiter {
    buckets: DashMap<i64, (f64, Instant)>,
    capacity: f64,
    refill_per_sec: f64,
}

impl EmbeddingRateLimiter {
    pub fn new(rate_per_minute: u32) -> Self {
        let capacity = rate_per_minute.max(1) as f64;
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_per_sec: capacity / 60.0,
        }
    }

    /// Attempts to withdraw one token for `user_id`. Returns `true` if a
    /// token was available.
    pub fn try_acquire(&self, user_id: i64) -> bool {
        let now = Instant::now();
        let mut entry = self
            .buckets
            .entry(user_id)
            .or_insert_with(|| (self.capacity, now));

        let (tokens, last_refill) = *entry;
        let elapsed = now.saturating_duration_since(last_refill).as_secs_f64();
        let refilled = (tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if refilled >= 1.0 {
            *entry = (refilled - 1.0, now);
            true
        } else {
            *entry = (refilled, now);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_recovers() {
        let limiter = EmbeddingRateLimiter::new(60); // 1/sec
        for _ in 0..60 {
            assert!(limiter.try_acquire(1));
        }
        assert!(!limiter.try_acquire(1));
    }

    #[test]
    fn buckets_are_independent_per_user() {
        let limiter = EmbeddingRateLimiter::new(1);
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
        assert!(limiter.try_acquire(2));
    }
}
