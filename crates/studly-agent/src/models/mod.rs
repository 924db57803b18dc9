pub mod a2a;
pub mod jsonrpc;

pub use a2a::{
    Artifact, Message, MessageConfiguration, Part, Role, TaskResult, TaskState, TaskStatus,
};
pub use jsonrpc::{ExecuteParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, MessageParams};
