//! The orchestrator (spec §4.9): the single place that ties identity,
//! classification, fan-out, and persistence together for one inbound event.

use crate::agent_caller::AgentCaller;
use crate::classifier;
use crate::db;
use crate::dlq;
use crate::error::Result;
use crate::identity;
use crate::metrics::Metrics;
use crate::models::{RouteRequest, RouteResponse};
use crate::parallel::{self, ParallelConfig};
use crate::registry::{self, AGENT_DLQ};
use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Router {
    pool: PgPool,
    metrics: Arc<Metrics>,
    agent_caller: Arc<AgentCaller>,
    parallel_config: ParallelConfig,
}

impl Router {
    pub fn new(pool: PgPool, metrics: Arc<Metrics>, agent_caller: Arc<AgentCaller>) -> Self {
        Self {
            pool,
            metrics,
            agent_caller,
            parallel_config: ParallelConfig::default(),
        }
    }

    /// Handle one inbound `/route` request end to end. The replay worker does
    /// not call this — it re-ingests DLQ rows through a simplified path of
    /// its own (spec §4.11) that never re-enters fan-out.
    pub async fn route(&self, req: &RouteRequest, trace_id: &str) -> Result<RouteResponse> {
        let start = Instant::now();

        let ts = req.ts.clone().unwrap_or_else(|| Utc::now().to_rfc3339());
        let classification_payload = req.classification_payload();
        let log_id = identity::message_id(
            &req.tenant_id,
            req.event_id.as_deref(),
            req.user_id.as_deref(),
            &ts,
            req.payload_version,
            &classification_payload,
        );

        if let Some(existing) = db::find_log(&self.pool, &log_id).await? {
            info!(log_id, "duplicate event, returning cached routing decision");
            self.metrics.rejected_total.with_label_values(&["duplicate"]).inc();
            let routed_agents: Vec<String> =
                serde_json::from_value(existing.routed_agents).unwrap_or_default();
            return Ok(RouteResponse {
                status: "already_processed".to_string(),
                routed_agents,
                trace_id: trace_id.to_string(),
                logging_status: None,
            });
        }

        let (kind, confidence) = match req.kind.clone() {
            Some(explicit) => (explicit, 1.0),
            None => classifier::classify(&classification_payload),
        };

        // routing_payload: classification payload enriched with the request's
        // metadata shell (spec §4.9 step 5) — this is what actually goes over
        // the wire to agents and what gets archived alongside a DLQ entry.
        let mut routing_payload = match classification_payload.clone() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        routing_payload.insert("tenant_id".to_string(), json!(req.tenant_id));
        routing_payload.insert("user_id".to_string(), json!(req.user_id));
        routing_payload.insert("message_id".to_string(), json!(log_id));
        routing_payload.insert("ts".to_string(), json!(ts));
        routing_payload.insert("type".to_string(), json!(req.type_));
        let routing_payload = Value::Object(routing_payload);

        self.metrics.ingress_total.with_label_values(&[&kind]).inc();

        let agents = registry::agents_for(&kind);
        // The response `status` is always "routed_to_dlq" for a [DLQ]-only
        // route, but the persisted DLQ reason must reflect *why* — the only
        // kind the registry maps to [DLQ] today is the classifier's
        // `unknown` (spec §7/§8 scenario 4: status routed_to_dlq, DLQ row
        // reason unknown_kind). `routed_to_dlq` is reserved for a
        // hypothetical DLQ-only route that isn't due to failed
        // classification.
        let short_circuit = if agents.is_empty() {
            Some(("no_agents_available", dlq::REASON_NO_AGENTS))
        } else if agents.iter().all(|a| a == AGENT_DLQ) {
            let reason = if kind == classifier::KIND_UNKNOWN {
                dlq::REASON_UNKNOWN_KIND
            } else {
                dlq::REASON_ROUTED_TO_DLQ
            };
            Some(("routed_to_dlq", reason))
        } else {
            None
        };

        let (status, routed_agents, response_body, extra_dlq_reason) = if let Some((status, reason)) = short_circuit {
            (status.to_string(), vec![AGENT_DLQ.to_string()], json!({ "status": status }), Some(reason))
        } else {
            let trace_id_owned = trace_id.to_string();
            let call_payload = routing_payload.clone();
            let caller = self.agent_caller.clone();
            let results = parallel::execute(&self.parallel_config, agents.clone(), move |agent| {
                let caller = caller.clone();
                let payload = call_payload.clone();
                let trace_id = trace_id_owned.clone();
                async move { caller.call(&agent, &payload, &trace_id).await }
            })
            .await;

            let mut successful = Vec::new();
            let mut failed = Vec::new();
            let mut responses = Map::new();
            for (agent, result) in agents.iter().zip(results.into_iter()) {
                match result {
                    Some(value) => {
                        successful.push(agent.clone());
                        responses.insert(agent.clone(), value);
                    }
                    None => failed.push(agent.clone()),
                }
            }

            if successful.is_empty() && !failed.is_empty() {
                (
                    "all_agents_failed".to_string(),
                    vec![AGENT_DLQ.to_string()],
                    json!({ "status": "all_agents_failed", "failed": failed }),
                    Some(dlq::REASON_ALL_AGENTS_FAILED),
                )
            } else {
                (
                    "success".to_string(),
                    successful.clone(),
                    json!({
                        "status": "success",
                        "successful": successful,
                        "failed": failed,
                        "responses": responses,
                    }),
                    None,
                )
            }
        };

        if let Some(reason) = extra_dlq_reason {
            let dlq_payload = json!({
                "tenant_id": req.tenant_id,
                "event_id": req.event_id,
                "user_id": req.user_id,
                "payload_version": req.payload_version,
                "ts": ts,
                "kind": kind,
                "routing_payload": classification_payload,
            });
            dlq::write(&self.pool, &self.metrics, &log_id, reason, &dlq_payload).await;
        }

        let processing_ms = start.elapsed().as_secs_f64() * 1000.0;
        let metadata = json!({
            "trace_id": trace_id,
            "confidence": confidence,
            "tenant_id": req.tenant_id,
            "event_id": req.event_id,
            "user_id": req.user_id,
            "processing_time_ms": processing_ms,
        });

        let mut logging_status = None;
        if let Err(e) = db::upsert_log(
            &self.pool,
            &log_id,
            Utc::now(),
            req.sender_id(),
            &kind,
            &json!(routed_agents),
            &response_body,
            &metadata,
        )
        .await
        {
            warn!(log_id, error = %e, event = "logging_fallback", "failed to persist log row");
            logging_status = Some("failed".to_string());
        }

        self.metrics
            .latency_seconds
            .with_label_values(&["route", &kind])
            .observe(start.elapsed().as_secs_f64());

        Ok(RouteResponse {
            status,
            routed_agents,
            trace_id: trace_id.to_string(),
            logging_status,
        })
    }
}
