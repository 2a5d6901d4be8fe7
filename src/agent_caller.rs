//! Agent caller (spec §4.7): one HTTP POST to one agent, behind the circuit
//! breaker and retry executor.

use crate::circuit::CircuitBreakerManager;
use crate::metrics::Metrics;
use crate::registry::{self, AGENT_DLQ};
use crate::retry::{with_retry, RetryConfig};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AgentCallError {
    #[error("circuit open for {0}")]
    CircuitOpen(String),
    #[error("missing endpoint for agent {0}")]
    MissingEndpoint(String),
    #[error("agent responded with status {status}")]
    StatusError { status: u16 },
    #[error("transport error calling agent: {0}")]
    CallError(String),
}

pub struct AgentCaller {
    client: reqwest::Client,
    breaker: CircuitBreakerManager,
    metrics: std::sync::Arc<Metrics>,
    mock_agents_url: String,
    timeout: Duration,
}

impl AgentCaller {
    pub fn new(breaker: CircuitBreakerManager, metrics: std::sync::Arc<Metrics>, mock_agents_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            breaker,
            metrics,
            mock_agents_url,
            timeout: Duration::from_secs(2),
        }
    }

    /// One attempt, no retry: POST `payload ∪ {trace_id}` to `agent`'s
    /// endpoint with `X-Trace-ID`. `DLQ` is synthetic and never makes an
    /// HTTP call.
    async fn call_once(&self, agent: &str, payload: &Value, trace_id: &str) -> Result<Value, AgentCallError> {
        if agent == AGENT_DLQ {
            return Ok(json!({"status": "queued_for_dlq"}));
        }

        if self.breaker.is_open(agent) {
            return Err(AgentCallError::CircuitOpen(agent.to_string()));
        }

        let Some(endpoint) = registry::endpoint(agent, &self.mock_agents_url) else {
            self.metrics
                .downstream_fail_total
                .with_label_values(&[agent, "missing_endpoint"])
                .inc();
            return Err(AgentCallError::MissingEndpoint(agent.to_string()));
        };

        let mut body = payload.clone();
        if let Value::Object(ref mut map) = body {
            map.insert("trace_id".to_string(), json!(trace_id));
        }

        let response = self
            .client
            .post(&endpoint)
            .header("X-Trace-ID", trace_id)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                self.breaker.record_success(agent);
                self.metrics.downstream_success_total.with_label_values(&[agent]).inc();
                resp.json::<Value>().await.map_err(|e| {
                    error!(agent, error = %e, "failed to decode agent response body");
                    AgentCallError::CallError(e.to_string())
                })
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                self.breaker.record_failure(agent);
                self.metrics
                    .downstream_fail_total
                    .with_label_values(&[agent, "status_error"])
                    .inc();
                Err(AgentCallError::StatusError { status })
            }
            Err(e) => {
                self.breaker.record_failure(agent);
                self.metrics
                    .downstream_fail_total
                    .with_label_values(&[agent, "call_error"])
                    .inc();
                Err(AgentCallError::CallError(e.to_string()))
            }
        }
    }

    /// Wrapped by the retry executor: up to `RetryConfig::max_attempts`
    /// attempts with exponential backoff.
    pub async fn call(&self, agent: &str, payload: &Value, trace_id: &str) -> anyhow::Result<Value> {
        let retry_config = RetryConfig::default();
        with_retry(&retry_config, &self.metrics, agent, || self.call_once(agent, payload, trace_id))
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AGENT_AXIS;
    use std::sync::Arc;

    #[tokio::test]
    async fn dlq_short_circuits_without_http() {
        let caller = AgentCaller::new(
            CircuitBreakerManager::default(),
            Arc::new(Metrics::new().unwrap()),
            "http://127.0.0.1:1".to_string(), // unroutable — would fail if ever dialed
        );
        let result = caller.call(AGENT_DLQ, &json!({"text": "x"}), "trace1").await.unwrap();
        assert_eq!(result, json!({"status": "queued_for_dlq"}));
    }

    #[tokio::test]
    async fn success_records_breaker_success_and_decodes_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/agents/axis")
            .match_header("X-Trace-ID", "trace1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"received": true}"#)
            .create_async()
            .await;

        let caller = AgentCaller::new(CircuitBreakerManager::default(), Arc::new(Metrics::new().unwrap()), server.url());
        let result = caller.call(AGENT_AXIS, &json!({"text": "help"}), "trace1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"received": true}));
    }

    #[tokio::test]
    async fn exhausted_5xx_trips_breaker_after_threshold_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/agents/axis")
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let metrics = Arc::new(Metrics::new().unwrap());
        let caller = AgentCaller::new(CircuitBreakerManager::default(), metrics.clone(), server.url());

        // RetryConfig::default() gives 3 attempts per call(); 2 calls = 6
        // recorded failures, past the breaker's default threshold of 5.
        let _ = caller.call(AGENT_AXIS, &json!({"text": "help"}), "t1").await;
        let _ = caller.call(AGENT_AXIS, &json!({"text": "help"}), "t2").await;

        let result = caller.call(AGENT_AXIS, &json!({"text": "help"}), "t3").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("circuit open"));
    }

    #[tokio::test]
    async fn missing_endpoint_for_unknown_agent() {
        let caller = AgentCaller::new(
            CircuitBreakerManager::default(),
            Arc::new(Metrics::new().unwrap()),
            "http://127.0.0.1:1".to_string(),
        );
        let result = caller.call("NotARealAgent", &json!({}), "t1").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("missing endpoint"));
    }
}
