use axum::{http::HeaderMap, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: &'static str,
    pub description: &'static str,
    pub url: String,
    pub version: &'static str,
    pub capabilities: Capabilities,
    pub default_input_modes: Vec<&'static str>,
    pub default_output_modes: Vec<&'static str>,
    pub skills: Vec<Skill>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub streaming: bool,
    pub push_notifications: bool,
}

#[derive(Debug, Serialize)]
pub struct Skill {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub tags: Vec<&'static str>,
}

pub async fn agent_card(headers: HeaderMap) -> Json<AgentCard> {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    Json(AgentCard {
        name: "Studly",
        description: "Builds personalized study plans and keeps track of the conversation around them.",
        url: format!("http://{}/tasks/send", host),
        version: env!("CARGO_PKG_VERSION"),
        capabilities: Capabilities {
            streaming: false,
            push_notifications: false,
        },
        default_input_modes: vec!["text"],
        default_output_modes: vec!["text"],
        skills: vec![Skill {
            id: "generate_study_plan",
            name: "Generate study plan",
            description: "Creates a structured study plan with durations, daily goals, time estimates and tips.",
            tags: vec!["study", "planning", "education"],
        }],
    })
}
