//! Dead-letter queue writer (spec §4.10). Persists irrecoverable events to
//! the `dlq` table with its own short retry loop; if even that is
//! exhausted, the event is logged at `error` level rather than dropped
//! silently (spec invariant: "a DLQ write failure is never swallowed").

use crate::db;
use crate::metrics::Metrics;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tracing::error;

const MAX_ATTEMPTS: u32 = 3;
const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Known DLQ reasons (spec §4.10). Kept as a closed set rather than
/// free-form strings so `/dlq/status`'s reason breakdown stays meaningful.
pub const REASON_UNKNOWN_KIND: &str = "unknown_kind";
pub const REASON_NO_AGENTS: &str = "no_agents_for_kind";
pub const REASON_ALL_AGENTS_FAILED: &str = "all_agents_failed";
pub const REASON_ROUTED_TO_DLQ: &str = "routed_to_dlq";

/// Write one event to the DLQ, retrying the insert itself up to
/// `MAX_ATTEMPTS` times before falling back to a structured log line.
pub async fn write(pool: &PgPool, metrics: &Metrics, log_id: &str, reason: &str, payload: &Value) {
    let mut attempt = 0u32;
    loop {
        match db::insert_dlq(pool, log_id, reason, payload).await {
            Ok(()) => {
                metrics.dlq_total.with_label_values(&[reason]).inc();
                return;
            }
            Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                let backoff = MIN_BACKOFF * 2u32.pow(attempt);
                attempt += 1;
                tracing::warn!(log_id, reason, attempt, error = %e, "dlq insert failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                error!(
                    event = "dlq_fallback",
                    log_id,
                    reason,
                    error = %e,
                    payload = %payload,
                    "dlq insert exhausted retries; event recorded in logs only"
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[sqlx::test(migrations = "./migrations")]
    async fn write_inserts_row_and_bumps_metric(pool: PgPool) {
        let metrics = Metrics::new().unwrap();
        write(&pool, &metrics, "log-1", REASON_UNKNOWN_KIND, &json!({"text": "lorem ipsum"})).await;

        let count = db::count_dlq(&pool).await.unwrap();
        assert_eq!(count, 1);

        let text = metrics.export().unwrap();
        assert!(text.contains("router_dlq_total"));
    }
}
