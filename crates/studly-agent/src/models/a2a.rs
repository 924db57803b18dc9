use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ===== MESSAGE MODELS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }

    /// Role of the `index`-th entry in an alternating history that starts with the user.
    pub fn alternating(index: usize) -> Self {
        if index % 2 == 0 {
            Self::User
        } else {
            Self::Agent
        }
    }
}

/// One fragment of a message, discriminated by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
    },
    Data {
        data: Value,
    },
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

fn message_kind() -> String {
    "message".to_string()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default = "message_kind")]
    pub kind: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default = "new_id")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            kind: message_kind(),
            role,
            parts,
            message_id: new_id(),
            task_id: None,
            metadata: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, vec![Part::text(text)])
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// First text part, if the message has one.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }
}

// ===== TASK MODELS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Working,
    Completed,
    InputRequired,
    Failed,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default = "now_rfc3339")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl TaskStatus {
    pub fn completed(message: Message) -> Self {
        Self::at(TaskState::Completed, Some(message), Utc::now())
    }

    pub fn at(state: TaskState, message: Option<Message>, timestamp: DateTime<Utc>) -> Self {
        Self {
            state,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default = "new_id")]
    pub artifact_id: String,
    pub name: String,
    pub parts: Vec<Part>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            artifact_id: new_id(),
            name: name.into(),
            parts,
        }
    }
}

fn task_kind() -> String {
    "task".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default = "task_kind")]
    pub kind: String,
}

impl TaskResult {
    /// Text of the status message, empty when there is none.
    pub fn response_text(&self) -> &str {
        self.status
            .message
            .as_ref()
            .and_then(Message::first_text)
            .unwrap_or_default()
    }
}

// ===== REQUEST CONFIGURATION =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotificationConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Value>,
}

fn default_output_modes() -> Vec<String> {
    vec![
        "text/plain".to_string(),
        "image/png".to_string(),
        "image/svg+xml".to_string(),
    ]
}

fn default_blocking() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageConfiguration {
    #[serde(default = "default_blocking")]
    pub blocking: bool,
    #[serde(default = "default_output_modes")]
    pub accepted_output_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notification_config: Option<PushNotificationConfig>,
}

impl Default for MessageConfiguration {
    fn default() -> Self {
        Self {
            blocking: default_blocking(),
            accepted_output_modes: default_output_modes(),
            push_notification_config: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let msg = Message::agent("Plan").with_task_id("task-1");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["kind"], "message");
        assert_eq!(value["role"], "agent");
        assert_eq!(value["taskId"], "task-1");
        assert_eq!(value["parts"][0], json!({"kind": "text", "text": "Plan"}));
        assert!(value["messageId"].as_str().is_some());
    }

    #[test]
    fn test_message_defaults_on_deserialize() {
        let msg: Message = serde_json::from_value(json!({
            "role": "user",
            "parts": [{"kind": "text", "text": "Learn Rust"}, {"kind": "data", "data": {"a": 1}}]
        }))
        .unwrap();

        assert_eq!(msg.kind, "message");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.first_text(), Some("Learn Rust"));
        assert!(!msg.message_id.is_empty());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let parsed: Result<Message, _> = serde_json::from_value(json!({
            "role": "wizard",
            "parts": []
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_task_state_kebab_case() {
        let status = TaskStatus::at(TaskState::InputRequired, None, Utc::now());
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "input-required");
    }

    #[test]
    fn test_alternating_roles() {
        assert_eq!(Role::alternating(0), Role::User);
        assert_eq!(Role::alternating(1), Role::Agent);
        assert_eq!(Role::alternating(4), Role::User);
    }
}
