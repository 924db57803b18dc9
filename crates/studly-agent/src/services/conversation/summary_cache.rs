use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Generated summaries keyed by conversation id.
///
/// Entries are written once and never refreshed when the conversation grows;
/// only [`SummaryCache::invalidate`] (conversation reset or eviction) drops them.
#[derive(Default)]
pub struct SummaryCache {
    entries: DashMap<String, String>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<String> {
        match self.entries.get(conversation_id) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, conversation_id: &str, summary: impl Into<String>) {
        self.entries.insert(conversation_id.to_string(), summary.into());
        debug!("Cached summary for conversation {}", conversation_id);
    }

    /// Returns true if a summary was cached for this conversation.
    pub fn invalidate(&self, conversation_id: &str) -> bool {
        self.entries.remove(conversation_id).is_some()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.entries.contains_key(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> SummaryCacheStats {
        SummaryCacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SummaryCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic_operations() {
        let cache = SummaryCache::new();

        assert_eq!(cache.get("ctx"), None);
        cache.insert("ctx", "Learner wants Python in two weeks.");
        assert_eq!(cache.get("ctx").as_deref(), Some("Learner wants Python in two weeks."));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate("ctx"));
        assert!(!cache.invalidate("ctx"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = SummaryCache::new();
        cache.get("a");
        cache.insert("a", "s");
        cache.get("a");
        cache.get("a");

        let stats = cache.stats();
        assert_eq!(stats, SummaryCacheStats { entries: 1, hits: 2, misses: 1 });
    }

    #[test]
    fn test_entries_are_per_conversation() {
        let cache = SummaryCache::new();
        cache.insert("a", "first");
        cache.insert("b", "second");
        cache.invalidate("a");

        assert!(!cache.contains("a"));
        assert_eq!(cache.get("b").as_deref(), Some("second"));
    }
}
