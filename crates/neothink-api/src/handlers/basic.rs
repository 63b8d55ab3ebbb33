//! Health endpoints.

use axum::Extension;
use axum::extract::State;
use axum::response::Json;
use neothink_core::Platform;
use serde::Serialize;
use serde_json::{Value, json};

use super::ServerState;

/// Liveness check.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "neothink",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub platform: Platform,
    pub version: String,
    pub uptime: i64,
}

/// Health with the resolved platform and uptime.
pub async fn health_status_handler(
    State(state): State<ServerState>,
    Extension(platform): Extension<Platform>,
) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        platform,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: chrono::Utc::now().timestamp() - state.started_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let Json(value) = health_handler().await;
        assert_eq!(value["status"], "ok");
        assert_eq!(value["service"], "neothink");
    }
}
