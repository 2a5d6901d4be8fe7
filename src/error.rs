//! Error taxonomy for the router.
//!
//! Routing *outcomes* (duplicate, all-agents-failed, routed-to-dlq) are not
//! errors — they are reported as 200 with a `status` field. `RouterError` is
//! reserved for failures that happen before a routing decision is made, or
//! that are truly exceptional (database unreachable, bad config).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid api key")]
    AuthFailed,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("circuit open for agent {agent}")]
    CircuitOpen { agent: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("agent call failed: {0}")]
    Agent(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RouterError::AuthFailed => (StatusCode::UNAUTHORIZED, "auth_failed"),
            RouterError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            RouterError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            RouterError::CircuitOpen { .. } => (StatusCode::SERVICE_UNAVAILABLE, "circuit_open"),
            RouterError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            RouterError::Agent(_) => (StatusCode::INTERNAL_SERVER_ERROR, "agent_error"),
            RouterError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        (
            status,
            Json(json!({
                "error": code,
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
