use axum::response::Json;
use serde_json::json;

/// Health check endpoint handler.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ping`
///
/// ```bash
/// curl http://localhost:3000/ping
/// # Response: {"status":"pong"}
/// ```
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "pong" }))
}
