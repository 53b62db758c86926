use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::negotiation::NegotiationEngine;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub store: String,
    pub agent: String,
}

pub struct HealthHandler {
    engine: Arc<NegotiationEngine>,
    start_time: std::time::Instant,
}

impl HealthHandler {
    pub fn new(engine: Arc<NegotiationEngine>) -> Self {
        Self {
            engine,
            start_time: std::time::Instant::now(),
        }
    }

    /// Basic health check - reports store health alongside uptime
    pub async fn health(&self) -> impl IntoResponse {
        let store = match self.engine.health_check().await {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("error: {}", e),
        };
        let status = HealthStatus {
            status: if store == "ok" { "healthy" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            checks: HealthChecks {
                store,
                agent: self.engine.agent_name().to_string(),
            },
        };

        (StatusCode::OK, Json(status))
    }

    /// Readiness check - 200 only when the conversation store answers
    pub async fn ready(&self) -> impl IntoResponse {
        match self.engine.health_check().await {
            Ok(()) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ready",
                    "message": "Server is ready to accept requests"
                })),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Readiness check failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({
                        "status": "not_ready",
                        "message": e.to_string()
                    })),
                )
            }
        }
    }

    /// Liveness check - returns 200 if server is alive
    pub async fn live(&self) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "alive",
                "message": "Server is alive"
            })),
        )
    }
}
