use axum::{body::Bytes, extract::State, Json};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::jsonrpc::{JSONRPC_VERSION, METHOD_EXECUTE, METHOD_MESSAGE_SEND};
use crate::models::{ExecuteParams, JsonRpcRequest, JsonRpcResponse, MessageParams};
use crate::services::TaskAgent;
use crate::utils::error::{ApiError, RpcFailure};

/// JSON-RPC task endpoint (`message/send`, `execute`).
///
/// The body is parsed by hand so malformed envelopes get a JSON-RPC error
/// object instead of axum's plain-text rejection.
pub async fn tasks_send(
    State(agent): State<Arc<TaskAgent>>,
    body: Bytes,
) -> Result<Json<JsonRpcResponse>, RpcFailure> {
    let request = parse_envelope(&body)?;
    let id = request.id.clone();
    info!("JSON-RPC {} (id={})", request.method, id);

    let result = match request.method.as_str() {
        METHOD_MESSAGE_SEND => {
            let params: MessageParams = serde_json::from_value(request.params)
                .map_err(|e| RpcFailure::new(id.clone(), ApiError::InvalidParams(e.to_string())))?;
            if !params.configuration.blocking {
                debug!("Non-blocking delivery requested, answering synchronously");
            }
            agent.process_payload(&params.message, None, None).await
        }
        METHOD_EXECUTE => {
            let params: ExecuteParams = serde_json::from_value(request.params)
                .map_err(|e| RpcFailure::new(id.clone(), ApiError::InvalidParams(e.to_string())))?;
            agent
                .process_with_timeout(params.messages, params.context_id, params.task_id)
                .await
        }
        other => {
            return Err(RpcFailure::new(
                id,
                ApiError::MethodNotFound(other.to_string()),
            ))
        }
    };

    result
        .map(|task| Json(JsonRpcResponse::success(id.clone(), task)))
        .map_err(|e| RpcFailure::new(id, e))
}

fn parse_envelope(body: &[u8]) -> Result<JsonRpcRequest, RpcFailure> {
    let invalid = |id: Value, reason: String| RpcFailure::new(id, ApiError::InvalidRequest(reason));

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| invalid(Value::Null, format!("parse error: {}", e)))?;

    let Some(object) = value.as_object() else {
        return Err(invalid(Value::Null, "request must be a JSON object".to_string()));
    };
    let id = object.get("id").cloned().unwrap_or(Value::Null);

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(invalid(id, "jsonrpc must be \"2.0\"".to_string()));
    }
    if !object.contains_key("id") {
        return Err(invalid(id, "id is required".to_string()));
    }

    serde_json::from_value(value).map_err(|e| invalid(id, e.to_string()))
}
