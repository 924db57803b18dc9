use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::models::{JsonRpcError, JsonRpcResponse};
use crate::services::agent::AgentError;

/// JSON-RPC error codes used by the task endpoint.
pub mod codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const TIMEOUT: i64 = -32000;
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidParams(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::Timeout(_) => codes::TIMEOUT,
            Self::InternalError(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Error object for the JSON-RPC envelope. Internal details go to `data`
    /// so operators can see them without callers having to parse the message.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::InternalError(details) => JsonRpcError {
                code: self.code(),
                message: "Internal error".to_string(),
                data: Some(json!({ "details": details })),
            },
            Self::Timeout(after) => JsonRpcError {
                code: self.code(),
                message: format!("Request timeout after {:.1}s", after.as_secs_f64()),
                data: None,
            },
            other => JsonRpcError {
                code: other.code(),
                message: other.to_string(),
                data: None,
            },
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::EmptyMessages => {
                Self::InvalidParams("messages must not be empty".to_string())
            }
            AgentError::Timeout(after) => Self::Timeout(after),
            AgentError::Internal(inner) => Self::InternalError(format!("{:#}", inner)),
        }
    }
}

/// An [`ApiError`] bound to the id of the JSON-RPC request it answers.
#[derive(Debug)]
pub struct RpcFailure {
    pub id: Value,
    pub error: ApiError,
}

impl RpcFailure {
    pub fn new(id: Value, error: impl Into<ApiError>) -> Self {
        Self {
            id,
            error: error.into(),
        }
    }
}

impl IntoResponse for RpcFailure {
    fn into_response(self) -> Response {
        let status = self.error.status();
        match &self.error {
            ApiError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
            ApiError::Timeout(after) => tracing::warn!("Request timed out after {:?}", after),
            other => tracing::warn!("{}", other),
        }

        let body = JsonRpcResponse::failure(self.id, self.error.to_rpc_error());
        (status, Json(body)).into_response()
    }
}
