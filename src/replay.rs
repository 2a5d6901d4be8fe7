//! Background replay worker (spec §4.11).
//!
//! Periodically drains the `dlq` table. Unlike `/route`, replay never
//! re-enters the full classifier or fan-out pipeline: it performs a
//! simplified re-ingest that writes a `logs` row with `status: replayed`
//! directly and removes the DLQ entry. Rows whose `log_id` has since
//! appeared in `logs` (a concurrent `/route` call beat the worker to it)
//! are dropped without being replayed.

use crate::db;
use crate::metrics::Metrics;
use crate::models::{DlqRow, ReplayTriggerResponse};
use crate::registry::{self, AGENT_AXIS, AGENT_M};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct ReplayWorker {
    pool: PgPool,
    metrics: Arc<Metrics>,
    mock_agents_url: String,
    interval: Duration,
    batch_size: i64,
}

impl ReplayWorker {
    pub fn new(pool: PgPool, metrics: Arc<Metrics>, mock_agents_url: String, interval: Duration, batch_size: i64) -> Self {
        Self {
            pool,
            metrics,
            mock_agents_url,
            interval,
            batch_size,
        }
    }

    /// Runs forever on a `tokio::time::interval` tick, intended to be
    /// `tokio::spawn`ed once from `main`. Exits on the next tick boundary
    /// once `shutdown` is cancelled.
    pub async fn run(&self, shutdown: tokio_util::sync::CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if shutdown.is_cancelled() {
                        return;
                    }
                    if let Err(e) = self.tick("automated").await {
                        warn!(error = %e, "replay tick failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    return;
                }
            }
        }
    }

    async fn tick(&self, mode: &str) -> anyhow::Result<usize> {
        self.metrics.replay_runs_total.with_label_values(&[mode]).inc();

        if !self.agents_healthy().await {
            info!("skipping replay tick: no downstream agent is healthy");
            return Ok(0);
        }

        if db::count_dlq(&self.pool).await? == 0 {
            return Ok(0);
        }

        let batch = db::fetch_dlq_batch(&self.pool, self.batch_size).await?;
        let mut processed = 0;
        for row in batch {
            match self.replay_row(&row, mode).await {
                Ok(()) => processed += 1,
                Err(e) => warn!(dlq_id = row.id, error = %e, "failed to replay dlq row"),
            }
        }
        Ok(processed)
    }

    /// Manual replay via `POST /dlq/replay`. `dry_run` reports intended
    /// actions without writing anything.
    pub async fn trigger(&self, limit: Option<i64>, dry_run: bool) -> anyhow::Result<ReplayTriggerResponse> {
        let limit = limit.unwrap_or(self.batch_size);
        let healthy = self.agents_healthy().await;

        if !healthy {
            return Ok(ReplayTriggerResponse {
                status: "skipped_unhealthy".to_string(),
                limit,
                agents_healthy: false,
            });
        }

        if dry_run {
            return Ok(ReplayTriggerResponse {
                status: "dry_run".to_string(),
                limit,
                agents_healthy: true,
            });
        }

        let batch = db::fetch_dlq_batch(&self.pool, limit).await?;
        for row in &batch {
            if let Err(e) = self.replay_row(row, "manual").await {
                warn!(dlq_id = row.id, error = %e, "failed to replay dlq row");
            }
        }

        Ok(ReplayTriggerResponse {
            status: "replayed".to_string(),
            limit,
            agents_healthy: true,
        })
    }

    async fn replay_row(&self, row: &DlqRow, mode: &str) -> anyhow::Result<()> {
        if db::find_log(&self.pool, &row.log_id).await?.is_some() {
            db::delete_dlq(&self.pool, row.id).await?;
            self.metrics.replay_items_total.with_label_values(&[mode, "skipped"]).inc();
            return Ok(());
        }

        let kind = infer_kind(&row.payload);
        let sender_id = row
            .payload
            .get("user_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| row.payload.get("tenant_id").and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string();
        let routed_agents = registry::agents_for(&kind);
        let response = json!({ "status": "replayed" });
        let metadata = json!({
            "replayed": true,
            "dlq_id": row.id,
            "original_reason": row.reason,
        });

        match db::upsert_log(&self.pool, &row.log_id, row.ts, &sender_id, &kind, &json!(routed_agents), &response, &metadata).await
        {
            Ok(()) => {
                db::delete_dlq(&self.pool, row.id).await?;
                self.metrics.replay_items_total.with_label_values(&[mode, "success"]).inc();
                Ok(())
            }
            Err(e) => {
                db::increment_dlq_attempts(&self.pool, row.id).await?;
                self.metrics.replay_items_total.with_label_values(&[mode, "error"]).inc();
                Err(e.into())
            }
        }
    }

    /// A single healthy agent enables replay (spec §4.11 step 1) — this is
    /// not "all agents must be up", just a guard against replaying into a
    /// fleet that's entirely down and recreating the same DLQ entries.
    async fn agents_healthy(&self) -> bool {
        let client = reqwest::Client::new();
        for agent in [AGENT_AXIS, AGENT_M] {
            let Some(base) = registry::endpoint(agent, &self.mock_agents_url) else { continue };
            let health_url = format!("{base}/health");
            if let Ok(resp) = client.get(&health_url).timeout(Duration::from_secs(2)).send().await {
                if resp.status().is_success() {
                    return true;
                }
            }
        }
        false
    }
}

/// Simplified classification (spec §4.11 / §9): infer `kind` from the
/// payload's own `kind` field if present, otherwise the same keyword
/// heuristic `/route` uses, run over the archived routing payload.
fn infer_kind(payload: &Value) -> String {
    if let Some(kind) = payload.get("kind").and_then(Value::as_str) {
        return kind.to_string();
    }
    let routing_payload = payload.get("routing_payload").unwrap_or(payload);
    let (kind, _) = crate::classifier::classify(routing_payload);
    kind
}
