//! The JSON-RPC entry point. The core's responsibility ends at handing the
//! dispatcher an authenticated principal and its isolated pool; actual method
//! dispatch (tools, resources, prompts) plugs in at [`dispatch`].

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::connection::DbPool, error::AppError, models::principal::Principal, state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

pub async fn rpc(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<RpcRequest>,
) -> Result<Json<Value>, AppError> {
    if request.jsonrpc != "2.0" {
        return Ok(Json(error_response(
            request.id,
            -32600,
            "Invalid Request: expected jsonrpc 2.0",
        )));
    }

    let pool = state.broker.lease(&principal, Utc::now())?;

    Ok(Json(dispatch(request, &principal, &pool).await))
}

async fn dispatch(request: RpcRequest, _principal: &Principal, _pool: &DbPool) -> Value {
    match request.method.as_str() {
        "ping" => json!({
            "jsonrpc": "2.0",
            "id": request.id,
            "result": {},
        }),
        other => error_response(
            request.id,
            -32601,
            &format!("Method not found: {}", other),
        ),
    }
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}
