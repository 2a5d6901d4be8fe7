//! Persistence layer: parameterized queries over the `logs` and `dlq` tables
//! (spec §3). No query here is string-interpolated — see DESIGN.md's
//! resolution of the "SQL built by string interpolation" Open Question.

use crate::models::{DlqReasonCount, DlqRow, DlqStatusResponse, LogRow};
use serde_json::Value;
use sqlx::PgPool;

/// Look up an existing log row by `log_id`, for the dedupe probe.
pub async fn find_log(pool: &PgPool, log_id: &str) -> sqlx::Result<Option<LogRow>> {
    sqlx::query_as::<_, LogRow>(
        "SELECT log_id, ts, sender_id, kind, routed_agents, response, metadata FROM logs WHERE log_id = $1",
    )
    .bind(log_id)
    .fetch_optional(pool)
    .await
}

/// Insert a new log row, or merge into an existing one. `metadata` is
/// merged via native `jsonb || jsonb` inside the same statement (spec
/// invariant 2): the response always reflects the most recent call.
pub async fn upsert_log(
    pool: &PgPool,
    log_id: &str,
    ts: chrono::DateTime<chrono::Utc>,
    sender_id: &str,
    kind: &str,
    routed_agents: &Value,
    response: &Value,
    metadata: &Value,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO logs (log_id, ts, sender_id, kind, routed_agents, response, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (log_id) DO UPDATE SET
            routed_agents = EXCLUDED.routed_agents,
            response = EXCLUDED.response,
            metadata = logs.metadata || EXCLUDED.metadata
        "#,
    )
    .bind(log_id)
    .bind(ts)
    .bind(sender_id)
    .bind(kind)
    .bind(routed_agents)
    .bind(response)
    .bind(metadata)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_logs_for_sender(pool: &PgPool, sender_id: &str, limit: i64, offset: i64) -> sqlx::Result<Vec<LogRow>> {
    sqlx::query_as::<_, LogRow>(
        "SELECT log_id, ts, sender_id, kind, routed_agents, response, metadata FROM logs \
         WHERE sender_id = $1 ORDER BY ts DESC LIMIT $2 OFFSET $3",
    )
    .bind(sender_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn insert_dlq(pool: &PgPool, log_id: &str, reason: &str, payload: &Value) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO dlq (log_id, reason, payload, attempts) VALUES ($1, $2, $3, 0)")
        .bind(log_id)
        .bind(reason)
        .bind(payload)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_dlq(pool: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM dlq WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub async fn increment_dlq_attempts(pool: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE dlq SET attempts = attempts + 1 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Rows ordered lowest-attempt, oldest-first — the order replay must
/// process them in (spec §4.11 step 3).
pub async fn fetch_dlq_batch(pool: &PgPool, limit: i64) -> sqlx::Result<Vec<DlqRow>> {
    sqlx::query_as::<_, DlqRow>(
        "SELECT id, ts, log_id, reason, payload, attempts FROM dlq ORDER BY ts ASC, attempts ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_dlq(pool: &PgPool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM dlq").fetch_one(pool).await
}

pub async fn dlq_status(pool: &PgPool) -> sqlx::Result<DlqStatusResponse> {
    let count: i64 = count_dlq(pool).await?;

    let oldest: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar("SELECT MIN(ts) FROM dlq")
        .fetch_one(pool)
        .await?;

    let max_attempts: Option<i32> = sqlx::query_scalar("SELECT MAX(attempts) FROM dlq").fetch_one(pool).await?;

    let unique_logs: Option<i64> = sqlx::query_scalar("SELECT COUNT(DISTINCT log_id) FROM dlq")
        .fetch_one(pool)
        .await?;

    let reason_rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT reason, COUNT(*) FROM dlq GROUP BY reason ORDER BY reason")
            .fetch_all(pool)
            .await?;

    Ok(DlqStatusResponse {
        count,
        oldest,
        max_attempts,
        unique_logs,
        reasons: reason_rows
            .into_iter()
            .map(|(reason, count)| DlqReasonCount { reason, count })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[sqlx::test(migrations = "./migrations")]
    async fn dedupe_round_trip(pool: PgPool) -> sqlx::Result<()> {
        assert!(find_log(&pool, "log-1").await?.is_none());

        upsert_log(
            &pool,
            "log-1",
            Utc::now(),
            "u1",
            "assist",
            &json!(["Axis"]),
            &json!({"status": "success"}),
            &json!({"trace_id": "t1"}),
        )
        .await?;

        let row = find_log(&pool, "log-1").await?.expect("row should exist");
        assert_eq!(row.kind, "assist");
        assert_eq!(row.routed_agents, json!(["Axis"]));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_merges_metadata_and_replaces_response(pool: PgPool) -> sqlx::Result<()> {
        upsert_log(
            &pool,
            "log-1",
            Utc::now(),
            "u1",
            "assist",
            &json!(["Axis"]),
            &json!({"status": "success"}),
            &json!({"trace_id": "t1", "confidence": 0.9}),
        )
        .await?;

        upsert_log(
            &pool,
            "log-1",
            Utc::now(),
            "u1",
            "assist",
            &json!(["Axis"]),
            &json!({"status": "success", "replayed": true}),
            &json!({"trace_id": "t2"}),
        )
        .await?;

        let row = find_log(&pool, "log-1").await?.unwrap();
        // most recent response wins...
        assert_eq!(row.response, Some(json!({"status": "success", "replayed": true})));
        // ...but metadata accretes across upserts (spec invariant 2).
        assert_eq!(row.metadata["confidence"], json!(0.9));
        assert_eq!(row.metadata["trace_id"], json!("t2"));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn dlq_lifecycle(pool: PgPool) -> sqlx::Result<()> {
        insert_dlq(&pool, "log-2", "unknown_kind", &json!({"text": "lorem ipsum"})).await?;
        assert_eq!(count_dlq(&pool).await?, 1);

        let batch = fetch_dlq_batch(&pool, 10).await?;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].attempts, 0);

        increment_dlq_attempts(&pool, batch[0].id).await?;
        let batch = fetch_dlq_batch(&pool, 10).await?;
        assert_eq!(batch[0].attempts, 1);

        delete_dlq(&pool, batch[0].id).await?;
        assert_eq!(count_dlq(&pool).await?, 0);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn dlq_status_aggregates_by_reason(pool: PgPool) -> sqlx::Result<()> {
        insert_dlq(&pool, "log-a", "unknown_kind", &json!({})).await?;
        insert_dlq(&pool, "log-b", "unknown_kind", &json!({})).await?;
        insert_dlq(&pool, "log-c", "all_agents_failed", &json!({})).await?;

        let status = dlq_status(&pool).await?;
        assert_eq!(status.count, 3);
        assert_eq!(status.unique_logs, Some(3));
        assert_eq!(status.reasons.len(), 2);
        Ok(())
    }
}
