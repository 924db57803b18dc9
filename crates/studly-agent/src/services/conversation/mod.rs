//! Conversation context management
//!
//! - Message normalization of inbound payloads
//! - Context building (raw history or cached summary)
//! - Summary cache and per-conversation store with eviction

mod context_builder;
mod normalizer;
mod store;
mod summary_cache;
mod token_counter;
pub mod types;

pub use context_builder::{
    serialize_history, ContextBuilder, FALLBACK_SUMMARY, NO_HISTORY_SENTINEL, RAW_HISTORY_PREFIX,
    SUMMARY_PREFIX,
};
pub use normalizer::{MessageNormalizer, NormalizedPayload};
pub use store::{Acquired, ConversationHandle, ConversationStore, EvictionPolicy};
pub use summary_cache::{SummaryCache, SummaryCacheStats};
pub use token_counter::TokenCounter;
pub use types::{ContextMode, ConversationState, PreparedContext, StoreStats};
