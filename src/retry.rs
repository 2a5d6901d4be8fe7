//! Retry executor with exponential backoff (spec §4.5).

use crate::metrics::Metrics;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use backoff::SystemClock;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

/// A fresh, deterministic doubling backoff (`randomization_factor = 0`) — the
/// spec calls for `min * 2^k` capped at `max`, not jittered retry, so jitter
/// is disabled rather than left at the crate's default.
fn backoff_policy(config: &RetryConfig) -> ExponentialBackoff<SystemClock> {
    ExponentialBackoff {
        current_interval: config.min_backoff,
        initial_interval: config.min_backoff,
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_interval: config.max_backoff,
        max_elapsed_time: None,
        clock: SystemClock::default(),
        start_time: std::time::Instant::now(),
    }
}

/// Run `operation` up to `config.max_attempts` times, sleeping with
/// exponential backoff between attempts. On exhaustion the last error is
/// returned unchanged. Attempts/successes/failures are counted against
/// `agent` in the metrics surface.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    metrics: &Metrics,
    agent: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err = None;
    let mut backoff = backoff_policy(config);

    for attempt in 0..config.max_attempts {
        metrics.retry_attempts_total.with_label_values(&[agent]).inc();
        match operation().await {
            Ok(value) => {
                metrics.retry_success_total.with_label_values(&[agent]).inc();
                return Ok(value);
            }
            Err(e) => {
                metrics.retry_failure_total.with_label_values(&[agent]).inc();
                warn!(agent, attempt, error = %e, "retry attempt failed");
                last_err = Some(e);
                if attempt + 1 < config.max_attempts {
                    let delay = backoff.next_backoff().unwrap_or(config.max_backoff);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.expect("at least one attempt always runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let metrics = Metrics::new().unwrap();
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry(&RetryConfig::default(), &metrics, "agent-a", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let metrics = Metrics::new().unwrap();
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let result: Result<u32, &str> = with_retry(&config, &metrics, "agent-a", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("transient") } else { Ok(7) } }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_and_surfaces_last_error() {
        let metrics = Metrics::new().unwrap();
        let config = RetryConfig {
            max_attempts: 3,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let result: Result<u32, &str> =
            with_retry(&config, &metrics, "agent-a", || async { Err("boom") }).await;
        assert_eq!(result.unwrap_err(), "boom");
    }
}
