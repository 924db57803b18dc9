use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HistoryConfig;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::{Artifact, Message, Part, TaskResult, TaskStatus};
use crate::services::conversation::{
    ContextBuilder, ContextMode, ConversationHandle, ConversationStore, MessageNormalizer,
    StoreStats, SummaryCache, SummaryCacheStats, TokenCounter,
};
use crate::services::generator::PlanGenerator;

pub const CLARIFICATION_TEXT: &str =
    "I didn't catch that. Could you rephrase your study request?";
pub const APOLOGY_TEXT: &str =
    "I encountered an issue generating the study plan. Please try again.";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("messages must not be empty")]
    EmptyMessages,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentStats {
    pub store: StoreStats,
    pub summaries: SummaryCacheStats,
}

/// Orchestrates one study-plan request: context preparation, generation
/// and the per-conversation bookkeeping.
pub struct TaskAgent {
    history: HistoryConfig,
    timeout: Duration,
    normalizer: MessageNormalizer,
    context_builder: ContextBuilder,
    summaries: Arc<SummaryCache>,
    store: Arc<ConversationStore>,
    generator: Arc<dyn PlanGenerator>,
    activity: ActivityLogger,
}

impl TaskAgent {
    pub fn new(
        history: HistoryConfig,
        store: Arc<ConversationStore>,
        generator: Arc<dyn PlanGenerator>,
        activity: ActivityLogger,
    ) -> Self {
        let summaries = Arc::new(SummaryCache::new());
        let context_builder =
            ContextBuilder::new(history.clone(), summaries.clone(), generator.clone());

        Self {
            normalizer: MessageNormalizer::new(history.cap_messages()),
            timeout: DEFAULT_TIMEOUT,
            history,
            context_builder,
            summaries,
            store,
            generator,
            activity,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn summaries(&self) -> &Arc<SummaryCache> {
        &self.summaries
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            store: self.store.stats(),
            summaries: self.summaries.stats(),
        }
    }

    /// Normalize a raw inbound message and process it under the request timeout.
    ///
    /// `taskId`/`contextId` carried by the message are used when the caller
    /// does not supply ids.
    pub async fn process_payload(
        &self,
        raw: &Value,
        context_id: Option<String>,
        task_id: Option<String>,
    ) -> Result<TaskResult, AgentError> {
        let context_id = context_id.or_else(|| string_field(raw, "contextId"));
        let task_id = task_id.or_else(|| string_field(raw, "taskId"));
        let (context_id, task_id) = resolve_ids(context_id, task_id);

        let payload = self.normalizer.extract(raw, None);
        debug!(
            "Normalized payload for {}: {} history item(s), query present: {}",
            context_id,
            payload.history.len(),
            payload.query.is_some()
        );

        if payload.query.is_none() {
            return Ok(self.clarification(&context_id, &task_id));
        }

        self.process_with_timeout(payload.into_messages(), Some(context_id), Some(task_id))
            .await
    }

    /// [`TaskAgent::process_messages`] bounded by the configured timeout.
    ///
    /// On timeout the request's store mutation is skipped entirely; other
    /// requests on the same conversation are unaffected.
    pub async fn process_with_timeout(
        &self,
        messages: Vec<Message>,
        context_id: Option<String>,
        task_id: Option<String>,
    ) -> Result<TaskResult, AgentError> {
        let (context_id, task_id) = resolve_ids(context_id, task_id);

        match tokio::time::timeout(
            self.timeout,
            self.process_messages(messages, Some(context_id.clone()), Some(task_id.clone())),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Request {} for {} timed out after {:?}", task_id, context_id, self.timeout);
                self.activity.log(
                    ActivityLog::builder(&context_id, &task_id, ActivityType::RequestTimeout)
                        .status(ActivityStatus::Error)
                        .processing_time(self.timeout.as_millis() as u64)
                        .error(format!("timeout after {:?}", self.timeout), "timeout")
                        .build(),
                );
                Err(AgentError::Timeout(self.timeout))
            }
        }
    }

    pub async fn process_messages(
        &self,
        messages: Vec<Message>,
        context_id: Option<String>,
        task_id: Option<String>,
    ) -> Result<TaskResult, AgentError> {
        let start = Instant::now();
        let (context_id, task_id) = resolve_ids(context_id, task_id);

        let Some(last) = messages.last() else {
            return Err(AgentError::EmptyMessages);
        };
        let query = last.first_text().unwrap_or_default().to_string();

        self.activity.log(
            ActivityLog::builder(&context_id, &task_id, ActivityType::RequestReceived)
                .status(ActivityStatus::Info)
                .message(&query)
                .history_len(messages.len() - 1)
                .token_count(TokenCounter::count_messages(&messages))
                .build(),
        );

        if query.trim().is_empty() {
            return Ok(self.clarification(&context_id, &task_id));
        }

        let handle = self.open_conversation(&context_id, &task_id);

        let prepared = self.context_builder.prepare(&messages, &context_id).await;
        self.log_context(
            &context_id,
            &task_id,
            prepared.mode,
            prepared.history_len,
            &prepared.text,
        );

        let llm_start = Instant::now();
        let response_text = match self.generator.generate_plan(&query, &prepared.text).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Plan generation failed for {}: {:#}", context_id, e);
                self.activity.log(
                    ActivityLog::builder(&context_id, &task_id, ActivityType::GeneratorError)
                        .error(format!("{:#}", e), "generator")
                        .build(),
                );
                APOLOGY_TEXT.to_string()
            }
        };
        let llm_ms = llm_start.elapsed().as_millis() as u64;

        self.record_turn(&handle, &query, &messages).await;

        let response = Message::agent(&response_text).with_task_id(&task_id);
        let mut history = messages;
        history.push(response.clone());
        let cap = self.history.cap_messages();
        if history.len() > cap {
            history.drain(..history.len() - cap);
        }

        self.activity.log(
            ActivityLog::builder(&context_id, &task_id, ActivityType::ResponseSent)
                .response(&response_text)
                .token_count(TokenCounter::count_prompt(&query, &prepared.text))
                .llm_duration(llm_ms)
                .processing_time(start.elapsed().as_millis() as u64)
                .build(),
        );
        info!(
            "Completed task {} for {} in {:?} ({} mode)",
            task_id,
            context_id,
            start.elapsed(),
            prepared.mode
        );

        Ok(TaskResult {
            id: task_id,
            context_id,
            status: TaskStatus::completed(response),
            artifacts: vec![Artifact::new("study_plan", vec![Part::text(response_text)])],
            history,
            kind: "task".to_string(),
        })
    }

    /// Claim the conversation before any summary is cached for it, so a
    /// summary never outlives the slot it belongs to. Evicted conversations
    /// lose their summaries here.
    fn open_conversation(&self, context_id: &str, task_id: &str) -> ConversationHandle {
        let acquired = self.store.acquire(context_id);

        if acquired.created {
            self.activity.log(
                ActivityLog::builder(context_id, task_id, ActivityType::ConversationCreated)
                    .status(ActivityStatus::Info)
                    .build(),
            );
        }
        for evicted in &acquired.evicted {
            self.summaries.invalidate(evicted);
            self.activity.log(
                ActivityLog::builder(evicted.as_str(), task_id, ActivityType::ConversationEvicted)
                    .status(ActivityStatus::Info)
                    .build(),
            );
        }
        acquired.handle
    }

    /// Append the utterance and refresh the message cache under the
    /// conversation's lock. Nothing after the lock is acquired suspends.
    async fn record_turn(&self, handle: &ConversationHandle, query: &str, messages: &[Message]) {
        let mut state = handle.lock().await;
        state.record_utterance(query);
        if self.history.enable_history_cache {
            state.last_messages = Some(messages.to_vec());
        }
        debug!("Conversation {} now has {} turn(s)", handle.id(), state.turn_count());
    }

    fn log_context(
        &self,
        context_id: &str,
        task_id: &str,
        mode: ContextMode,
        history_len: usize,
        text: &str,
    ) {
        let summary_event = match mode {
            ContextMode::FreshSummary => {
                Some((ActivityType::SummaryGenerated, ActivityStatus::Success))
            }
            ContextMode::CachedSummary => {
                Some((ActivityType::SummaryReused, ActivityStatus::Success))
            }
            ContextMode::FallbackSummary => {
                Some((ActivityType::SummaryFailed, ActivityStatus::Warning))
            }
            ContextMode::NoHistory | ContextMode::RawHistory => None,
        };
        if let Some((activity_type, status)) = summary_event {
            self.activity.log(
                ActivityLog::builder(context_id, task_id, activity_type)
                    .status(status)
                    .history_len(history_len)
                    .build(),
            );
        }

        self.activity.log(
            ActivityLog::builder(context_id, task_id, ActivityType::ContextPrepared)
                .context_mode(mode.as_str())
                .history_len(history_len)
                .token_count(TokenCounter::count_text(text))
                .build(),
        );
    }

    fn clarification(&self, context_id: &str, task_id: &str) -> TaskResult {
        debug!("Empty query for {}, asking for clarification", context_id);
        self.activity.log(
            ActivityLog::builder(context_id, task_id, ActivityType::ClarificationRequested)
                .status(ActivityStatus::Warning)
                .build(),
        );

        let response = Message::agent(CLARIFICATION_TEXT).with_task_id(task_id);
        TaskResult {
            id: task_id.to_string(),
            context_id: context_id.to_string(),
            status: TaskStatus::completed(response.clone()),
            artifacts: vec![Artifact::new("clarification", vec![Part::text(CLARIFICATION_TEXT)])],
            history: vec![response],
            kind: "task".to_string(),
        }
    }

    /// Forget a conversation: utterances, cached messages and summary.
    /// Returns whether anything was stored for it.
    pub fn reset(&self, context_id: &str) -> bool {
        let had_state = self.store.reset(context_id);
        let had_summary = self.summaries.invalidate(context_id);
        let existed = had_state || had_summary;

        self.activity.log(
            ActivityLog::builder(context_id, "", ActivityType::ConversationReset)
                .status(ActivityStatus::Info)
                .custom("existed", existed)
                .build(),
        );
        info!("Reset conversation {} (existed: {})", context_id, existed);
        existed
    }
}

fn resolve_ids(context_id: Option<String>, task_id: Option<String>) -> (String, String) {
    let fresh = || Uuid::new_v4().to_string();
    (
        context_id.filter(|id| !id.is_empty()).unwrap_or_else(fresh),
        task_id.filter(|id| !id.is_empty()).unwrap_or_else(fresh),
    )
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}
