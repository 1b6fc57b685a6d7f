use axum::response::Json;
use serde_json::{json, Value};

/// Liveness only; backends are not probed.
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "svc": "api-gateway" }))
}
