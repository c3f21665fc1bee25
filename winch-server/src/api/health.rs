//! Health Check API Handler

use axum::{Json, response::IntoResponse};

/// GET /health
/// Liveness check for the UI and deployment probes
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
