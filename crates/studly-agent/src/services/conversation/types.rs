use std::fmt;
use tokio::time::Instant;

use crate::models::Message;

/// Per-conversation state held by the conversation store.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Raw query text of every completed request, oldest first
    pub utterances: Vec<String>,

    /// Message list of the most recent request (history cache)
    pub last_messages: Option<Vec<Message>>,

    /// Creation time of this conversation entry
    pub created_at: Instant,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            utterances: Vec::new(),
            last_messages: None,
            created_at: Instant::now(),
        }
    }

    pub fn record_utterance(&mut self, text: impl Into<String>) {
        self.utterances.push(text.into());
    }

    pub fn turn_count(&self) -> usize {
        self.utterances.len()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Which prompting mode produced a context string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// Nothing before the current query
    NoHistory,
    /// Recent messages serialized as `role: text` lines
    RawHistory,
    /// Summary served from the cache
    CachedSummary,
    /// Summary generated for this request and cached
    FreshSummary,
    /// Summarizer failed; generic sentence used, nothing cached
    FallbackSummary,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoHistory => "no_history",
            Self::RawHistory => "raw_history",
            Self::CachedSummary => "cached_summary",
            Self::FreshSummary => "fresh_summary",
            Self::FallbackSummary => "fallback_summary",
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context string plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedContext {
    pub text: String,
    pub mode: ContextMode,
    /// Number of history messages considered (query excluded)
    pub history_len: usize,
}

/// Store statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub active_conversations: usize,
    pub in_use: usize,
    pub evictions_total: u64,
}
