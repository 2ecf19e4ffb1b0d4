use axum::response::Json;
use serde_json::{json, Value};

/// Liveness probe: no auth, no backend reads, just confirms the process is
/// up and serving.
pub async fn handler() -> Json<Value> {
    Json(json!({ "status": "catfish-proxy is running" }))
}

/// `GET /v1` status check, matching the root path clients sometimes probe
/// before hitting `/v1/chat/completions`.
pub async fn v1_status() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "catfish-proxy API is running" }))
}
