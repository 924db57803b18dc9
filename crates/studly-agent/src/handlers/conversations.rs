use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::services::TaskAgent;

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub conversation_id: String,
    pub existed: bool,
}

/// Drop everything remembered for a conversation.
pub async fn reset_conversation(
    State(agent): State<Arc<TaskAgent>>,
    Path(conversation_id): Path<String>,
) -> Json<ResetResponse> {
    let existed = agent.reset(&conversation_id);
    Json(ResetResponse {
        conversation_id,
        existed,
    })
}
