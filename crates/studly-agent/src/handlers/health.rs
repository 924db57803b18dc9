use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::TaskAgent;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    conversations: usize,
    summaries: usize,
}

pub async fn root() -> &'static str {
    "Server is live"
}

pub async fn health_check(
    State(agent): State<Arc<TaskAgent>>,
) -> (StatusCode, Json<HealthResponse>) {
    let stats = agent.stats();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            conversations: stats.store.active_conversations,
            summaries: stats.summaries.entries,
        }),
    )
}

/// Ready once a generator key is configured.
pub async fn readiness_check(State(settings): State<Arc<Settings>>) -> StatusCode {
    if settings.llm.api_key.is_empty() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}
