use axum::Json;
use serde_json::{json, Value};

pub const SERVER_NAME: &str = "postgres-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness probe. Served without authentication.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "server": SERVER_NAME,
        "version": SERVER_VERSION,
    }))
}
