use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{EvictionKind, StoreConfig};
use crate::models::Message;

use super::types::{ConversationState, StoreStats};

/// Bound on how many conversations the store keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Keep every conversation for the process lifetime
    Unbounded,
    /// Drop least recently active conversations above the bound
    Lru { max_conversations: usize },
    /// Drop conversations idle longer than `ttl`, and LRU above the bound
    IdleTtl {
        ttl: Duration,
        max_conversations: usize,
    },
}

impl EvictionPolicy {
    pub fn from_config(cfg: &StoreConfig) -> Self {
        let max_conversations = cfg.max_conversations.max(1);
        match cfg.eviction {
            EvictionKind::None => Self::Unbounded,
            EvictionKind::Lru => Self::Lru { max_conversations },
            EvictionKind::IdleTtl => Self::IdleTtl {
                ttl: Duration::from_secs(cfg.idle_ttl_seconds),
                max_conversations,
            },
        }
    }

    fn max_conversations(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Lru { max_conversations } | Self::IdleTtl { max_conversations, .. } => {
                Some(*max_conversations)
            }
        }
    }

    fn ttl(&self) -> Option<Duration> {
        match self {
            Self::IdleTtl { ttl, .. } => Some(*ttl),
            _ => None,
        }
    }
}

struct Slot {
    state: Mutex<ConversationState>,
    touched_ms: AtomicU64,
}

impl Slot {
    fn new(now_ms: u64) -> Self {
        Self {
            state: Mutex::new(ConversationState::new()),
            touched_ms: AtomicU64::new(now_ms),
        }
    }

    fn touch(&self, now_ms: u64) {
        self.touched_ms.store(now_ms, Ordering::Relaxed);
    }

    fn touched(&self) -> u64 {
        self.touched_ms.load(Ordering::Relaxed)
    }
}

/// No request holds or waits on this slot; only the map references it.
fn is_idle(slot: &Arc<Slot>) -> bool {
    Arc::strong_count(slot) == 1
}

/// A request's claim on one conversation. While it is alive the
/// conversation cannot be evicted.
pub struct ConversationHandle {
    id: String,
    slot: Arc<Slot>,
}

impl ConversationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Exclusive access to the conversation state. Requests for the same
    /// conversation queue here; other conversations are unaffected.
    pub async fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.slot.state.lock().await
    }
}

/// Result of [`ConversationStore::acquire`].
pub struct Acquired {
    pub handle: ConversationHandle,
    /// The conversation did not exist (or had expired) before this call
    pub created: bool,
    /// Conversations removed to respect the eviction policy
    pub evicted: Vec<String>,
}

/// Per-conversation state with one async mutex per conversation id.
///
/// Entries are created lazily on first use. The map itself is sharded
/// (DashMap) so conversations never contend with each other.
pub struct ConversationStore {
    slots: DashMap<String, Arc<Slot>>,
    policy: EvictionPolicy,
    epoch: Instant,
    evictions_total: AtomicU64,
}

impl ConversationStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        info!("Initializing conversation store with policy {:?}", policy);
        Self {
            slots: DashMap::new(),
            policy,
            epoch: Instant::now(),
            evictions_total: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn is_expired(&self, slot: &Slot, now_ms: u64) -> bool {
        self.policy
            .ttl()
            .is_some_and(|ttl| now_ms.saturating_sub(slot.touched()) > ttl.as_millis() as u64)
    }

    /// Get or lazily create the conversation and mark it active.
    pub fn acquire(&self, conversation_id: &str) -> Acquired {
        let now = self.now_ms();

        if let Some(slot) = self.live_slot(conversation_id, now) {
            slot.touch(now);
            return Acquired {
                handle: ConversationHandle {
                    id: conversation_id.to_string(),
                    slot,
                },
                created: false,
                evicted: Vec::new(),
            };
        }

        let mut evicted = Vec::new();

        // Expired and idle: start the conversation over.
        if self
            .slots
            .remove_if(conversation_id, |_, slot| {
                is_idle(slot) && self.is_expired(slot, now)
            })
            .is_some()
        {
            debug!("Conversation {} expired, recreating", conversation_id);
            self.evictions_total.fetch_add(1, Ordering::Relaxed);
            evicted.push(conversation_id.to_string());
        }

        let mut created = false;
        let slot = self
            .slots
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Slot::new(now))
            })
            .clone();
        slot.touch(now);

        if created {
            debug!("Created conversation {}", conversation_id);
            evicted.extend(self.enforce_limits(conversation_id, now));
        }

        Acquired {
            handle: ConversationHandle {
                id: conversation_id.to_string(),
                slot,
            },
            created,
            evicted,
        }
    }

    fn live_slot(&self, conversation_id: &str, now_ms: u64) -> Option<Arc<Slot>> {
        let entry = self.slots.get(conversation_id)?;
        let slot = entry.value();
        if is_idle(slot) && self.is_expired(slot, now_ms) {
            return None;
        }
        Some(slot.clone())
    }

    /// Apply the eviction policy, never touching `keep` or slots in use.
    fn enforce_limits(&self, keep: &str, now_ms: u64) -> Vec<String> {
        let mut evicted = Vec::new();

        if self.policy.ttl().is_some() {
            let expired: Vec<String> = self
                .slots
                .iter()
                .filter(|e| {
                    e.key() != keep && is_idle(e.value()) && self.is_expired(e.value(), now_ms)
                })
                .map(|e| e.key().clone())
                .collect();

            for id in expired {
                if self
                    .slots
                    .remove_if(&id, |_, slot| is_idle(slot) && self.is_expired(slot, now_ms))
                    .is_some()
                {
                    evicted.push(id);
                }
            }
        }

        if let Some(max) = self.policy.max_conversations() {
            let len = self.slots.len();
            if len > max {
                let excess = len - max;
                let mut candidates: Vec<(u64, String)> = self
                    .slots
                    .iter()
                    .filter(|e| e.key() != keep && is_idle(e.value()))
                    .map(|e| (e.value().touched(), e.key().clone()))
                    .collect();
                candidates.sort_unstable();

                let mut removed = 0;
                for (_, id) in candidates {
                    if removed == excess {
                        break;
                    }
                    if self.slots.remove_if(&id, |_, slot| is_idle(slot)).is_some() {
                        evicted.push(id);
                        removed += 1;
                    }
                }

                if removed < excess {
                    warn!(
                        "Conversation store over capacity ({} > {}), remaining entries are in use",
                        self.slots.len(),
                        max
                    );
                }
            }
        }

        if !evicted.is_empty() {
            self.evictions_total
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            info!("Evicted {} conversation(s)", evicted.len());
        }

        evicted
    }

    /// Forget a conversation. A request still holding a handle keeps
    /// writing to its detached state, which is then dropped.
    pub fn reset(&self, conversation_id: &str) -> bool {
        self.slots.remove(conversation_id).is_some()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.slots.contains_key(conversation_id)
    }

    /// Copy of the conversation state, waiting for any in-flight mutation.
    pub async fn snapshot(&self, conversation_id: &str) -> Option<ConversationState> {
        let slot = self.slots.get(conversation_id)?.value().clone();
        let state = slot.state.lock().await;
        Some(state.clone())
    }

    pub async fn utterances(&self, conversation_id: &str) -> Option<Vec<String>> {
        self.snapshot(conversation_id).await.map(|s| s.utterances)
    }

    pub async fn last_messages(&self, conversation_id: &str) -> Option<Vec<Message>> {
        self.snapshot(conversation_id)
            .await
            .and_then(|s| s.last_messages)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let in_use = self.slots.iter().filter(|e| !is_idle(e.value())).count();
        StoreStats {
            active_conversations: self.len(),
            in_use,
            evictions_total: self.evictions_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(EvictionPolicy::Unbounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test]
    async fn test_lazy_creation() {
        let store = ConversationStore::default();

        let first = store.acquire("ctx");
        assert!(first.created);
        drop(first);

        let second = store.acquire("ctx");
        assert!(!second.created);
        assert_eq!(second.handle.id(), "ctx");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_same_conversation() {
        let store = Arc::new(ConversationStore::default());

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let acquired = store.acquire("shared");
                    let mut state = acquired.handle.lock().await;
                    let before = state.utterances.clone();
                    tokio::task::yield_now().await;
                    state.utterances = before;
                    state.record_utterance(format!("req {}", i));
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let utterances = store.utterances("shared").await.unwrap();
        assert_eq!(utterances.len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_evicts_least_recent() {
        let store = ConversationStore::new(EvictionPolicy::Lru { max_conversations: 2 });

        drop(store.acquire("a"));
        advance(Duration::from_millis(10)).await;
        drop(store.acquire("b"));
        advance(Duration::from_millis(10)).await;
        drop(store.acquire("a"));
        advance(Duration::from_millis(10)).await;

        let acquired = store.acquire("c");
        assert!(acquired.created);
        assert_eq!(acquired.evicted, vec!["b".to_string()]);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert_eq!(store.stats().evictions_total, 1);
    }

    #[tokio::test]
    async fn test_busy_conversation_not_evicted() {
        let store = ConversationStore::new(EvictionPolicy::Lru { max_conversations: 1 });

        let held = store.acquire("busy");
        let acquired = store.acquire("new");

        assert!(acquired.evicted.is_empty());
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().in_use, 2);
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_ttl_expiry() {
        let store = ConversationStore::new(EvictionPolicy::IdleTtl {
            ttl: Duration::from_secs(10),
            max_conversations: 100,
        });

        {
            let acquired = store.acquire("old");
            acquired.handle.lock().await.record_utterance("hello");
        }
        drop(store.acquire("stale"));

        advance(Duration::from_secs(11)).await;

        let again = store.acquire("old");
        assert!(again.created);
        assert_eq!(again.evicted, vec!["old".to_string(), "stale".to_string()]);
        assert!(again.handle.lock().await.utterances.is_empty());
    }

    #[tokio::test]
    async fn test_reset_detaches_state() {
        let store = ConversationStore::default();
        {
            let acquired = store.acquire("ctx");
            acquired.handle.lock().await.record_utterance("one");
        }

        assert!(store.reset("ctx"));
        assert!(!store.reset("ctx"));
        assert_eq!(store.utterances("ctx").await, None);

        let acquired = store.acquire("ctx");
        assert!(acquired.created);
    }

    #[test]
    fn test_policy_from_config() {
        let cfg = StoreConfig {
            eviction: EvictionKind::IdleTtl,
            max_conversations: 0,
            idle_ttl_seconds: 60,
        };
        assert_eq!(
            EvictionPolicy::from_config(&cfg),
            EvictionPolicy::IdleTtl {
                ttl: Duration::from_secs(60),
                max_conversations: 1
            }
        );
    }
}
