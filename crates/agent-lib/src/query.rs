//! Backoff-retrying query executor
//!
//! Every provider call that can be throttled runs through [`QueryExecutor`].
//! Throttled calls are retried with exponential backoff; any other failure is
//! returned on the spot. Nothing else in the crate retries.

use crate::error::{ProviderError, QueryError};
use crate::observability::AgentMetrics;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule for throttled provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry; doubles for every retry after it
    pub initial_delay: Duration,
    /// Total attempts including the first one
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_attempts: 4,
        }
    }
}

impl BackoffPolicy {
    pub const MAX_ATTEMPTS: u32 = 16;

    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`
    pub fn new(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_attempts: max_attempts.clamp(1, Self::MAX_ATTEMPTS),
        }
    }

    /// Sleeps between attempts, in order; saturates at `Duration::MAX`
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.min(Self::MAX_ATTEMPTS).saturating_sub(1))
            .map(|retry| {
                self.initial_delay
                    .checked_mul(2u32.saturating_pow(retry))
                    .unwrap_or(Duration::MAX)
            })
            .collect()
    }

    /// Upper bound on time spent sleeping for a single call
    pub fn worst_case_wait(&self) -> Duration {
        self.delays()
            .into_iter()
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Runs provider calls under a [`BackoffPolicy`]
#[derive(Clone, Default)]
pub struct QueryExecutor {
    policy: BackoffPolicy,
    metrics: AgentMetrics,
}

impl QueryExecutor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            metrics: AgentMetrics::new(),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Run `query` until it succeeds, fails without throttling, or runs out
    /// of attempts
    ///
    /// `operation` only labels log records.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut query: F) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut delays = self.policy.delays().into_iter();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match query().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_throttling() => match delays.next() {
                    Some(delay) => {
                        debug!(
                            operation = %operation,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Provider throttled request, backing off"
                        );
                        self.metrics.inc_provider_retries();
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(
                            operation = %operation,
                            attempts = attempt,
                            "Provider request permanently throttled"
                        );
                        self.metrics.inc_permanently_throttled();
                        return Err(QueryError::PermanentlyThrottled { attempts: attempt });
                    }
                },
                Err(e) => return Err(QueryError::Provider(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Query that throttles `throttles` times, then returns 42
    fn flaky(
        throttles: u32,
        calls: Arc<AtomicU32>,
        attempt_times: Arc<Mutex<Vec<Instant>>>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, ProviderError>> {
        move || {
            attempt_times.lock().unwrap().push(Instant::now());
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < throttles {
                std::future::ready(Err(ProviderError::Throttling("Throttling".into())))
            } else {
                std::future::ready(Ok(42))
            }
        }
    }

    #[test]
    fn test_default_policy_delays() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(7));
    }

    #[test]
    fn test_policy_needs_at_least_one_attempt() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), 0);
        assert_eq!(policy.max_attempts, 1);
        assert!(policy.delays().is_empty());
    }

    #[test]
    fn test_long_delays_saturate() {
        let policy = BackoffPolicy::new(Duration::from_secs(u64::MAX / 4), 8);
        let delays = policy.delays();

        assert_eq!(delays.len(), 7);
        assert_eq!(delays[1], Duration::from_secs(u64::MAX / 4 * 2));
        assert_eq!(delays[6], Duration::MAX);
        assert_eq!(policy.worst_case_wait(), Duration::MAX);
    }

    #[test]
    fn test_attempts_are_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(1), u32::MAX);
        assert_eq!(policy.max_attempts, BackoffPolicy::MAX_ATTEMPTS);
        assert_eq!(policy.delays().len(), 15);
        assert_eq!(policy.delays()[14], Duration::from_millis(1 << 14));

        // Fields are public, so an oversized value can bypass new()
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            max_attempts: 1_000,
        };
        assert_eq!(policy.delays().len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_three_throttles() {
        let executor = QueryExecutor::default();
        let calls = Arc::new(AtomicU32::new(0));
        let times = Arc::new(Mutex::new(Vec::new()));

        let result = executor
            .execute("test", flaky(3, calls.clone(), times.clone()))
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let times = times.lock().unwrap();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanently_throttled() {
        let executor = QueryExecutor::default();
        let calls = Arc::new(AtomicU32::new(0));
        let times = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let result = executor
            .execute("test", flaky(10, calls.clone(), times))
            .await;

        assert_eq!(result, Err(QueryError::PermanentlyThrottled { attempts: 4 }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_throttling_error_is_not_retried() {
        let executor = QueryExecutor::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, _> = executor
            .execute("test", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(ProviderError::Auth("bad key".into())))
            })
            .await;

        assert_eq!(
            result,
            Err(QueryError::Provider(ProviderError::Auth("bad key".into())))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
