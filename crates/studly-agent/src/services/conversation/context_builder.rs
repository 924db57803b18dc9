use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::HistoryConfig;
use crate::models::Message;
use crate::services::generator::PlanGenerator;

use super::summary_cache::SummaryCache;
use super::token_counter::TokenCounter;
use super::types::{ContextMode, PreparedContext};

pub const NO_HISTORY_SENTINEL: &str = "No previous conversation history.";
pub const RAW_HISTORY_PREFIX: &str = "Recent conversation:\n";
pub const SUMMARY_PREFIX: &str = "Summary of previous conversation: ";
pub const FALLBACK_SUMMARY: &str = "Previous conversation about study planning.";
pub const NON_TEXT_PLACEHOLDER: &str = "[non-text]";

/// Turns a capped message sequence into the context string for the generator.
///
/// Short histories are passed through as `role: text` lines. Once the
/// history reaches `summary_threshold` it is summarized once per
/// conversation and the summary is reused from then on.
pub struct ContextBuilder {
    history: HistoryConfig,
    summaries: Arc<SummaryCache>,
    generator: Arc<dyn PlanGenerator>,
}

impl ContextBuilder {
    pub fn new(
        history: HistoryConfig,
        summaries: Arc<SummaryCache>,
        generator: Arc<dyn PlanGenerator>,
    ) -> Self {
        Self {
            history,
            summaries,
            generator,
        }
    }

    pub fn summaries(&self) -> &Arc<SummaryCache> {
        &self.summaries
    }

    pub async fn prepare_context(&self, messages: &[Message], conversation_id: &str) -> String {
        self.prepare(messages, conversation_id).await.text
    }

    /// Everything but the last message counts as history.
    pub async fn prepare(&self, messages: &[Message], conversation_id: &str) -> PreparedContext {
        let history = match messages.split_last() {
            Some((_, history)) if !history.is_empty() => history,
            _ => {
                return PreparedContext {
                    text: NO_HISTORY_SENTINEL.to_string(),
                    mode: ContextMode::NoHistory,
                    history_len: 0,
                }
            }
        };

        let history_len = history.len();
        let serialized = serialize_history(history);

        if !self.should_summarize(history_len) {
            debug!(
                "Using raw history for {} ({} messages, ~{} tokens)",
                conversation_id,
                history_len,
                TokenCounter::count_text(&serialized)
            );
            return PreparedContext {
                text: format!("{}{}", RAW_HISTORY_PREFIX, serialized),
                mode: ContextMode::RawHistory,
                history_len,
            };
        }

        let (summary, mode) = self.summary_for(conversation_id, &serialized).await;
        PreparedContext {
            text: format!("{}{}", SUMMARY_PREFIX, summary),
            mode,
            history_len,
        }
    }

    fn should_summarize(&self, history_len: usize) -> bool {
        self.history.enable_summarization && history_len >= self.history.summary_threshold
    }

    async fn summary_for(&self, conversation_id: &str, serialized: &str) -> (String, ContextMode) {
        if let Some(cached) = self.summaries.get(conversation_id) {
            debug!("Reusing cached summary for {}", conversation_id);
            return (cached, ContextMode::CachedSummary);
        }

        match self.generator.generate_summary(serialized).await {
            Ok(summary) if !summary.trim().is_empty() => {
                let summary = summary.trim().to_string();
                self.summaries.insert(conversation_id, summary.clone());
                info!(
                    "Generated summary for {} (~{} tokens)",
                    conversation_id,
                    TokenCounter::count_text(&summary)
                );
                (summary, ContextMode::FreshSummary)
            }
            Ok(_) => {
                warn!("Summarizer returned empty text for {}", conversation_id);
                (FALLBACK_SUMMARY.to_string(), ContextMode::FallbackSummary)
            }
            Err(e) => {
                warn!("Summarization failed for {}: {:#}", conversation_id, e);
                (FALLBACK_SUMMARY.to_string(), ContextMode::FallbackSummary)
            }
        }
    }
}

/// One `role: text` line per message.
pub fn serialize_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            format!(
                "{}: {}",
                m.role.as_str(),
                m.first_text().unwrap_or(NON_TEXT_PLACEHOLDER)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
