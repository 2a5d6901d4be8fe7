//! axum HTTP handlers (spec §6).

use crate::error::{Result, RouterError};
use crate::models::{
    DlqStatusResponse, HealthResponse, LogsQuery, ReplayQuery, ReplayTriggerResponse, RouteRequest, RouteResponse,
};
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Map};
use std::time::Instant;

fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let supplied = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
    match supplied {
        Some(key) if key == state.config.api_key => Ok(()),
        _ => {
            state.metrics.rejected_total.with_label_values(&["auth"]).inc();
            Err(RouterError::AuthFailed)
        }
    }
}

pub async fn route_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteResponse>> {
    check_api_key(&state, &headers)?;

    if req.tenant_id.trim().is_empty() {
        return Err(RouterError::ValidationFailed("tenant_id must not be empty".to_string()));
    }

    if !state.rate_limiter.admit(req.sender_id()) {
        state.metrics.rejected_total.with_label_values(&["rate_limit"]).inc();
        return Err(RouterError::RateLimited);
    }

    let trace_id = uuid::Uuid::new_v4().simple().to_string();
    let response = state.router.route(&req, &trace_id).await?;
    Ok(Json(response))
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let mut components = Map::new();
    let mut overall_ok = true;

    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => {
            components.insert("database".to_string(), json!("ok"));
        }
        Err(e) => {
            overall_ok = false;
            components.insert("database".to_string(), json!(e.to_string()));
        }
    }

    let body = HealthResponse {
        status: if overall_ok { "ok" } else { "error" },
        components,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    };

    let status_code = if overall_ok { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    (status_code, Json(body))
}

pub async fn logs_handler(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<LogsQuery>) -> Result<impl IntoResponse> {
    check_api_key(&state, &headers)?;

    let limit = q.limit.unwrap_or(100).clamp(1, state.config.max_logs_limit);
    let offset = q.offset.unwrap_or(0).max(0);

    let rows = crate::db::list_logs_for_sender(&state.db, &q.sender_id, limit, offset).await?;
    Ok(Json(rows))
}

pub async fn dlq_status_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<DlqStatusResponse>> {
    check_api_key(&state, &headers)?;
    let status = crate::db::dlq_status(&state.db).await?;
    Ok(Json(status))
}

pub async fn dlq_replay_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ReplayQuery>,
) -> Result<Json<ReplayTriggerResponse>> {
    check_api_key(&state, &headers)?;
    let result = state
        .replay
        .trigger(q.limit, q.dry_run.unwrap_or(false))
        .await
        .map_err(|e| RouterError::Internal(e.to_string()))?;
    Ok(Json(result))
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
