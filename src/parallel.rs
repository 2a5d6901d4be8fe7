//! Bounded-concurrency fan-out executor (spec §4.6).
//!
//! Runs an async operation over N items with a concurrency semaphore and a
//! per-task timeout. Results preserve input order. A task that times out or
//! errors yields `None` in its slot — the executor itself never fails.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct ParallelConfig {
    pub max_concurrency: usize,
    pub task_timeout: Duration,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            task_timeout: Duration::from_secs(3),
        }
    }
}

/// Execute `operation` once per item in `items`, bounded by
/// `config.max_concurrency` concurrent tasks and `config.task_timeout` each.
pub async fn execute<T, I, F, Fut>(config: &ParallelConfig, items: Vec<I>, operation: F) -> Vec<Option<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send,
{
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let operation = Arc::new(operation);
    let timeout = config.task_timeout;

    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let semaphore = semaphore.clone();
            let operation = operation.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                match tokio::time::timeout(timeout, operation(item)).await {
                    Ok(Ok(value)) => Some(value),
                    Ok(Err(e)) => {
                        warn!(error = %e, "parallel task failed");
                        None
                    }
                    Err(_) => {
                        warn!("parallel task timed out");
                        None
                    }
                }
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        // A panicking task is treated the same as a failed one: absent slot.
        results.push(handle.await.unwrap_or(None));
    }
    results
}
