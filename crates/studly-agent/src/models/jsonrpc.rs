use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::a2a::{Message, MessageConfiguration, TaskResult};

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_MESSAGE_SEND: &str = "message/send";
pub const METHOD_EXECUTE: &str = "execute";

// ===== REQUEST MODELS =====

/// Envelope as received. `params` stays raw until the method is known.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// `message/send` params. The message is kept as raw JSON so that it can be
/// normalized from whatever shape the caller sends.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageParams {
    pub message: Value,
    #[serde(default)]
    pub configuration: MessageConfiguration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub messages: Vec<Message>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: TaskResult) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}
