use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::TaskAgent;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub agent: Arc<TaskAgent>,
}

impl FromRef<AppState> for Arc<TaskAgent> {
    fn from_ref(state: &AppState) -> Self {
        state.agent.clone()
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}
