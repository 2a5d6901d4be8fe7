//! Wire types for the HTTP surface (spec §6).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `POST /route` body. `tenant_id` is the only strictly required field; the
/// rest of the JSON body — any keys not named below — forms the
/// classification payload and participates in `message_id` (spec §9,
/// "duck-typed payloads").
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_payload_version")]
    pub payload_version: i64,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    /// Everything else in the request body.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_payload_version() -> i64 {
    1
}

impl RouteRequest {
    /// The classification payload: the request body minus the metadata
    /// shell (spec §4.9 step 2).
    pub fn classification_payload(&self) -> Value {
        Value::Object(self.extra.clone())
    }

    /// The identity under which this event is rate-limited and logged.
    /// Neither the spec's body schema nor `logs` carries a separate
    /// `sender_id` field from the caller, so `user_id` (falling back to
    /// `tenant_id`) plays that role.
    pub fn sender_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.tenant_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    pub status: String,
    pub routed_agents: Vec<String>,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LogRow {
    pub log_id: String,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub sender_id: String,
    pub kind: String,
    pub routed_agents: Value,
    pub response: Option<Value>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DlqRow {
    pub id: i64,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub log_id: String,
    pub reason: String,
    pub payload: Value,
    pub attempts: i32,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: Map<String, Value>,
    pub latency_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct DlqStatusResponse {
    pub count: i64,
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
    pub max_attempts: Option<i32>,
    pub unique_logs: Option<i64>,
    pub reasons: Vec<DlqReasonCount>,
}

#[derive(Debug, Serialize)]
pub struct DlqReasonCount {
    pub reason: String,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub sender_id: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReplayQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ReplayTriggerResponse {
    pub status: String,
    pub limit: i64,
    pub agents_healthy: bool,
}
