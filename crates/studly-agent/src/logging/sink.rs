use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::info;

use super::types::{ActivityLog, ActivityType};

/// Destination for flushed activity batches.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Returns the number of records written.
    async fn write_batch(&self, batch: &[ActivityLog]) -> Result<usize>;
}

/// Emits every record as a structured event on the `activity` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ActivitySink for TracingSink {
    async fn write_batch(&self, batch: &[ActivityLog]) -> Result<usize> {
        for log in batch {
            let custom_fields = if log.custom_fields.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&log.custom_fields)?)
            };
            info!(
                target: "activity",
                conversation_id = %log.conversation_id,
                task_id = %log.task_id,
                activity_type = log.activity_type.as_str(),
                activity_status = log.activity_status.as_str(),
                message_content = log.message_content.as_deref(),
                response_content = log.response_content.as_deref(),
                context_mode = log.context_mode.as_deref(),
                history_len = log.history_len,
                token_count = log.token_count,
                processing_time_ms = log.processing_time_ms,
                llm_call_duration_ms = log.llm_call_duration_ms,
                error_message = log.error_message.as_deref(),
                error_type = log.error_type.as_deref(),
                created_at = %log.created_at.to_rfc3339(),
                custom_fields = custom_fields.as_deref(),
                "activity"
            );
        }
        Ok(batch.len())
    }
}

/// Keeps records in memory, for inspection in tests and debugging.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ActivityLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityLog> {
        self.records.lock().clone()
    }

    pub fn count(&self, activity_type: ActivityType) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.activity_type == activity_type)
            .count()
    }

    /// Poll until at least `n` records of `activity_type` arrived or `timeout` passes.
    pub async fn wait_for(&self, activity_type: ActivityType, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count(activity_type) >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl ActivitySink for MemorySink {
    async fn write_batch(&self, batch: &[ActivityLog]) -> Result<usize> {
        self.records.lock().extend_from_slice(batch);
        Ok(batch.len())
    }
}
