//! Thread-safe, bounded, time-evicted store of conversation transcripts.
//!
//! A single mutex guards the whole store. Operations are short critical
//! sections and the lock is never held across a generation call.
//!
//! Entries live in an unbounded LRU list: every read or write touch promotes the
//! conversation, so the least-recently-used end is always the conversation with
//! the oldest `last_accessed`. Capacity eviction pops from that end.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::conversation::config::StoreConfig;
use crate::conversation::errors::StoreResult;
use crate::conversation::ids::new_conversation_id;
use crate::conversation::reaper::{Reaper, ReaperHandle};
use crate::conversation::types::{ContextTurn, Conversation, Metadata};

/// Snapshot of store counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreStats {
    /// Conversations created since start-up.
    pub created_total: u64,
    /// Messages stored since start-up.
    pub messages_total: u64,
    /// Conversations removed by eviction passes.
    pub evicted_total: u64,
    /// Time of the last eviction pass, if any ran.
    pub last_eviction: Option<DateTime<Utc>>,
    /// Conversations currently held.
    pub active_count: usize,
    /// Configured capacity.
    pub max_conversations: usize,
    /// Configured idle age, in hours.
    pub max_age_hours: f64,
}

struct StoreState {
    conversations: LruCache<String, Conversation>,
    created_total: u64,
    messages_total: u64,
    evicted_total: u64,
    last_eviction: Option<DateTime<Utc>>,
}

/// In-memory conversation store.
pub struct ConversationStore {
    config: StoreConfig,
    state: Mutex<StoreState>,
    reaper: Mutex<Option<ReaperHandle>>,
}

impl ConversationStore {
    /// Create a store without a background reaper.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;

        info!(
            max_conversations = config.max_conversations,
            max_age_hours = config.max_age_hours(),
            "Conversation store initialized"
        );

        Ok(Self {
            config,
            state: Mutex::new(StoreState {
                conversations: LruCache::unbounded(),
                created_total: 0,
                messages_total: 0,
                evicted_total: 0,
                last_eviction: None,
            }),
            reaper: Mutex::new(None),
        })
    }

    /// Create a store and start its background reaper.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn spawn(config: StoreConfig) -> StoreResult<Arc<Self>> {
        let store = Arc::new(Self::new(config)?);
        let handle = Reaper::new(Arc::downgrade(&store), store.config.cleanup_interval).spawn();
        *store.reaper.lock() = Some(handle);
        Ok(store)
    }

    /// Stop the background reaper, if one is running, and wait for it to exit.
    pub async fn shutdown(&self) {
        let handle = self.reaper.lock().take();
        if let Some(handle) = handle {
            if handle.is_finished() {
                warn!("Conversation reaper had already exited");
            }
            handle.stop().await;
        }
    }

    /// Create a conversation and return its id.
    ///
    /// Without an id a fresh one is minted. An id that already exists is returned
    /// as is and the existing conversation is left untouched. Exceeding capacity
    /// runs a forced eviction pass before returning.
    pub fn create(&self, id: Option<&str>) -> String {
        let now = Utc::now();
        let id = id.map_or_else(new_conversation_id, ToString::to_string);

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.conversations.contains(id.as_str()) {
            warn!(conversation_id = %id, "Conversation already exists, returning existing");
            return id;
        }

        state
            .conversations
            .put(id.clone(), Conversation::new(id.clone(), now));
        state.created_total += 1;

        if state.conversations.len() > self.config.max_conversations {
            self.evict_locked(state, true, now);
        }

        info!(conversation_id = %id, "Created conversation");
        id
    }

    /// Append an exchange to a conversation.
    ///
    /// Returns `false`, without mutating anything, if the id is unknown.
    pub fn add_message(
        &self,
        id: &str,
        query: impl Into<String>,
        response: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> bool {
        let now = Utc::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(conversation) = state.conversations.get_mut(id) else {
            warn!(conversation_id = %id, "Conversation not found");
            return false;
        };

        conversation.push(query.into(), response.into(), metadata.unwrap_or_default(), now);
        let total = conversation.message_count();
        state.messages_total += 1;

        debug!(conversation_id = %id, messages = total, "Added message");
        true
    }

    /// Snapshot of a conversation. A hit counts as activity.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Conversation> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let conversation = state.conversations.get_mut(id)?;
        conversation.touch(now);
        Some(conversation.clone())
    }

    /// History of a conversation for the generation backend, limited to the last
    /// `last_n` messages (`0` means all). A hit counts as activity.
    #[must_use]
    pub fn context(&self, id: &str, last_n: usize) -> Option<Vec<ContextTurn>> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let conversation = state.conversations.get_mut(id)?;
        conversation.touch(now);
        Some(conversation.context(last_n))
    }

    /// Whether a conversation exists. Does not count as activity.
    #[must_use]
    pub fn exists(&self, id: &str) -> bool {
        self.state.lock().conversations.contains(id)
    }

    /// Remove a conversation. Returns `true` if it existed.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.state.lock().conversations.pop(id).is_some();
        if removed {
            info!(conversation_id = %id, "Deleted conversation");
        }
        removed
    }

    /// Remove every conversation and return how many were held.
    pub fn clear_all(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.conversations.len();
        state.conversations.clear();
        info!(count, "Cleared all conversations");
        count
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            created_total: state.created_total,
            messages_total: state.messages_total,
            evicted_total: state.evicted_total,
            last_eviction: state.last_eviction,
            active_count: state.conversations.len(),
            max_conversations: self.config.max_conversations,
            max_age_hours: self.config.max_age_hours(),
        }
    }

    /// Run an eviction pass and return the number of conversations removed.
    ///
    /// Unless `force` is set, the pass is skipped when the previous one ran less
    /// than `cleanup_interval` ago.
    pub fn evict(&self, force: bool) -> usize {
        self.evict_at(force, Utc::now())
    }

    fn evict_at(&self, force: bool, now: DateTime<Utc>) -> usize {
        let mut guard = self.state.lock();
        self.evict_locked(&mut guard, force, now)
    }

    fn evict_locked(&self, state: &mut StoreState, force: bool, now: DateTime<Utc>) -> usize {
        if !force {
            if let Some(last) = state.last_eviction {
                let interval =
                    TimeDelta::from_std(self.config.cleanup_interval).unwrap_or(TimeDelta::MAX);
                if now.signed_duration_since(last) < interval {
                    return 0;
                }
            }
        }

        // Age phase: unconditional.
        let cutoff = TimeDelta::from_std(self.config.max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));
        let stale: HashSet<String> = cutoff.map_or_else(HashSet::new, |cutoff| {
            state
                .conversations
                .iter()
                .filter(|(_, conversation)| conversation.last_accessed() < cutoff)
                .map(|(id, _)| id.clone())
                .collect()
        });

        let mut removed = 0_usize;
        for id in &stale {
            if state.conversations.pop(id.as_str()).is_some() {
                removed += 1;
            }
        }

        // Capacity phase: only when the age phase was not enough.
        let mut overflow = 0_usize;
        while state.conversations.len() > self.config.max_conversations {
            if state.conversations.pop_lru().is_none() {
                break;
            }
            overflow += 1;
        }
        removed += overflow;

        state.evicted_total += removed as u64;
        state.last_eviction = Some(now);

        if removed > 0 {
            info!(
                evicted = removed,
                stale = stale.len(),
                overflow,
                forced = force,
                "Evicted conversations"
            );
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::conversation::config::StoreConfigBuilder;

    fn store(max_conversations: usize) -> ConversationStore {
        let config = StoreConfigBuilder::new()
            .max_conversations(max_conversations)
            .max_age_hours(24)
            .cleanup_interval_seconds(3600)
            .build();
        ConversationStore::new(config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = StoreConfigBuilder::new().max_conversations(0).build();
        assert!(ConversationStore::new(config).is_err());
    }

    #[test]
    fn test_create_add_get() {
        let store = store(10);
        let id = store.create(None);

        assert!(store.add_message(&id, "hi", "hello", None));

        let conversation = store.get(&id).expect("conversation exists");
        assert_eq!(conversation.id(), id);
        assert_eq!(conversation.message_count(), 1);
        assert_eq!(conversation.messages()[0].query, "hi");
        assert_eq!(conversation.messages()[0].response, "hello");
    }

    #[test]
    fn test_add_message_unknown_id() {
        let store = store(10);
        let before = store.stats();

        assert!(!store.add_message("unknown-id", "q", "r", None));

        let after = store.stats();
        assert_eq!(before, after);
        assert!(!store.exists("unknown-id"));
    }

    #[test]
    fn test_messages_follow_call_order() {
        let store = store(10);
        let id = store.create(Some("ordered"));
        for i in 0..5 {
            assert!(store.add_message(&id, format!("q{i}"), format!("r{i}"), None));
        }
        assert!(!store.add_message("other", "x", "y", None));

        let conversation = store.get(&id).unwrap();
        let queries: Vec<&str> = conversation
            .messages()
            .iter()
            .map(|m| m.query.as_str())
            .collect();
        assert_eq!(queries, vec!["q0", "q1", "q2", "q3", "q4"]);
        assert_eq!(store.stats().messages_total, 5);
    }

    #[test]
    fn test_create_existing_is_idempotent() {
        let store = store(10);
        let id = store.create(Some("fixed"));
        assert!(store.add_message(&id, "q", "r", None));
        let before = store.get(&id);

        let again = store.create(Some("fixed"));
        assert_eq!(again, "fixed");

        let after = store.get(&id);
        assert_eq!(
            before.as_ref().map(|c| (c.messages().to_vec(), c.created_at())),
            after.as_ref().map(|c| (c.messages().to_vec(), c.created_at()))
        );
        assert_eq!(store.stats().created_total, 1);
        assert_eq!(store.stats().active_count, 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_accessed() {
        let store = store(2);
        let a = store.create(Some("a"));
        let b = store.create(Some("b"));
        let c = store.create(Some("c"));

        assert!(!store.exists(&a));
        assert!(store.exists(&b));
        assert!(store.exists(&c));
        assert_eq!(store.stats().evicted_total, 1);
        assert!(store.stats().last_eviction.is_some());
    }

    #[test]
    fn test_touch_protects_from_capacity_eviction() {
        let store = store(2);
        let a = store.create(Some("a"));
        let b = store.create(Some("b"));
        assert!(store.get(&a).is_some());

        store.create(Some("c"));

        assert!(store.exists(&a));
        assert!(!store.exists(&b));
    }

    #[test]
    fn test_active_count_never_exceeds_capacity() {
        let store = store(3);
        for _ in 0..20 {
            store.create(None);
            assert!(store.stats().active_count <= 3);
        }
        assert_eq!(store.stats().created_total, 20);
        assert_eq!(store.stats().evicted_total, 17);
    }

    #[test]
    fn test_age_eviction_is_unconditional() {
        let store = store(100);
        let id = store.create(None);
        assert!(store.add_message(&id, "q", "r", None));

        let later = Utc::now() + TimeDelta::hours(25);
        let removed = store.evict_at(true, later);

        assert_eq!(removed, 1);
        assert!(!store.exists(&id));
        assert_eq!(store.stats().evicted_total, 1);
    }

    #[test]
    fn test_fresh_conversations_survive_age_pass() {
        let store = store(100);
        let id = store.create(None);

        let soon = Utc::now() + TimeDelta::hours(1);
        assert_eq!(store.evict_at(true, soon), 0);
        assert!(store.exists(&id));
    }

    #[test]
    fn test_unforced_pass_respects_interval() {
        let store = store(100);
        let id = store.create(None);
        let base = Utc::now();

        // First pass always runs; nothing is stale yet.
        let first = base + TimeDelta::minutes(23 * 60 + 30);
        assert_eq!(store.evict_at(false, first), 0);
        assert!(store.stats().last_eviction.is_some());

        // Within the interval: skipped even though the conversation is now stale.
        assert_eq!(store.evict_at(false, first + TimeDelta::minutes(50)), 0);
        assert!(store.exists(&id));

        // Interval elapsed: runs.
        assert_eq!(store.evict_at(false, first + TimeDelta::minutes(90)), 1);
        assert!(!store.exists(&id));
    }

    #[test]
    fn test_context_returns_pairs_and_touches() {
        let store = store(10);
        let id = store.create(None);
        for i in 0..12 {
            assert!(store.add_message(&id, format!("q{i}"), format!("r{i}"), None));
        }

        let context = store.context(&id, 10).unwrap();
        assert_eq!(context.len(), 20);
        assert_eq!(context[0], ContextTurn::user("q2"));
        assert_eq!(context[19], ContextTurn::model("r11"));

        let all = store.context(&id, 0).unwrap();
        assert_eq!(all.len(), 24);

        assert!(store.context("missing", 10).is_none());
    }

    #[test]
    fn test_get_updates_last_accessed() {
        let store = store(10);
        let id = store.create(None);
        let first = store.get(&id).map(|c| c.last_accessed());
        std::thread::sleep(Duration::from_millis(5));
        let second = store.get(&id).map(|c| c.last_accessed());

        assert!(first.is_some());
        assert!(second > first);
    }

    #[test]
    fn test_get_missing_has_no_side_effects() {
        let store = store(10);
        assert!(store.get("nope").is_none());
        assert_eq!(store.stats().active_count, 0);
        assert_eq!(store.stats().created_total, 0);
    }

    #[test]
    fn test_delete_and_clear_all() {
        let store = store(10);
        let a = store.create(None);
        store.create(None);
        store.create(None);

        assert!(store.delete(&a));
        assert!(!store.delete(&a));
        assert_eq!(store.clear_all(), 2);
        assert_eq!(store.stats().active_count, 0);
    }

    #[test]
    fn test_stats_reports_config() {
        let store = store(42);
        let stats = store.stats();
        assert_eq!(stats.max_conversations, 42);
        assert!((stats.max_age_hours - 24.0).abs() < f64::EPSILON);
        assert!(stats.last_eviction.is_none());
    }

    #[test]
    fn test_concurrent_appends_are_all_recorded() {
        let store = Arc::new(store(10));
        let id = store.create(Some("shared"));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.add_message(&id, format!("w{worker}-{i}"), "r", None);
                    }
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().is_ok());
        }

        let count = store.get(&id).unwrap().message_count();
        assert_eq!(count, 200);
        assert_eq!(store.stats().messages_total, 200);
    }
}
