use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Activity type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    RequestReceived,
    ClarificationRequested,
    ContextPrepared,
    SummaryGenerated,
    SummaryReused,
    SummaryFailed,
    GeneratorError,
    ResponseSent,
    ConversationCreated,
    ConversationEvicted,
    ConversationReset,
    RequestTimeout,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestReceived => "request_received",
            Self::ClarificationRequested => "clarification_requested",
            Self::ContextPrepared => "context_prepared",
            Self::SummaryGenerated => "summary_generated",
            Self::SummaryReused => "summary_reused",
            Self::SummaryFailed => "summary_failed",
            Self::GeneratorError => "generator_error",
            Self::ResponseSent => "response_sent",
            Self::ConversationCreated => "conversation_created",
            Self::ConversationEvicted => "conversation_evicted",
            Self::ConversationReset => "conversation_reset",
            Self::RequestTimeout => "request_timeout",
        }
    }
}

/// Activity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
    Warning,
    Info,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Complete activity log entry
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    pub conversation_id: String,
    pub task_id: String,

    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    // Content
    pub message_content: Option<String>,
    pub response_content: Option<String>,

    // Context
    pub context_mode: Option<String>,
    pub history_len: Option<usize>,
    pub token_count: Option<usize>,

    // Performance
    pub processing_time_ms: Option<u64>,
    pub llm_call_duration_ms: Option<u64>,

    // Error
    pub error_message: Option<String>,
    pub error_type: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom_fields: HashMap<String, Value>,
}

impl ActivityLog {
    /// Create builder for fluent API
    pub fn builder(
        conversation_id: impl Into<String>,
        task_id: impl Into<String>,
        activity_type: ActivityType,
    ) -> ActivityLogBuilder {
        ActivityLogBuilder::new(conversation_id, task_id, activity_type)
    }
}

/// Builder pattern for ActivityLog
pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    pub fn new(
        conversation_id: impl Into<String>,
        task_id: impl Into<String>,
        activity_type: ActivityType,
    ) -> Self {
        Self {
            log: ActivityLog {
                conversation_id: conversation_id.into(),
                task_id: task_id.into(),
                activity_type,
                activity_status: ActivityStatus::Success,
                message_content: None,
                response_content: None,
                context_mode: None,
                history_len: None,
                token_count: None,
                processing_time_ms: None,
                llm_call_duration_ms: None,
                error_message: None,
                error_type: None,
                created_at: Utc::now(),
                custom_fields: HashMap::new(),
            },
        }
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.log.activity_status = status;
        self
    }

    pub fn message(mut self, content: impl Into<String>) -> Self {
        self.log.message_content = Some(content.into());
        self
    }

    pub fn response(mut self, content: impl Into<String>) -> Self {
        self.log.response_content = Some(content.into());
        self
    }

    pub fn context_mode(mut self, mode: impl Into<String>) -> Self {
        self.log.context_mode = Some(mode.into());
        self
    }

    pub fn history_len(mut self, len: usize) -> Self {
        self.log.history_len = Some(len);
        self
    }

    pub fn token_count(mut self, count: usize) -> Self {
        self.log.token_count = Some(count);
        self
    }

    pub fn processing_time(mut self, ms: u64) -> Self {
        self.log.processing_time_ms = Some(ms);
        self
    }

    pub fn llm_duration(mut self, ms: u64) -> Self {
        self.log.llm_call_duration_ms = Some(ms);
        self
    }

    pub fn error(mut self, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.error_type = Some(error_type.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    /// Add custom key-value data
    pub fn custom(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.log.custom_fields.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}
