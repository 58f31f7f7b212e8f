//! In-process handoff store with FIFO eviction
//!
//! The map never holds more than `max_handoffs` entries. Saving a new key at
//! capacity evicts the entry with the oldest `created_at`; replacing an
//! existing key never evicts. That eviction happens before the input is
//! validated; every other operation validates before it mutates, so a
//! failed call leaves the map as it was.

use crate::config::Config;
use crate::error::{StorageError, StorageResult};
use crate::events::{EventRecorder, HandoffEvent, HandoffEventKind, TracingRecorder};
use crate::merge;
use crate::messages::{truncate_messages, MAX_MESSAGES_RANGE};
use crate::store::HandoffStore;
use crate::types::{
    ClearOutcome, Handoff, HandoffSummary, LimitsSnapshot, MergeOutcome, MergeSpec,
    MergeStrategy, MessageResponse, SaveInput, SaveOutcome, StoreStats, UsageSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Source of `created_at` timestamps
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct LocalStore {
    config: Arc<Config>,
    handoffs: RwLock<HashMap<String, Handoff>>,
    recorder: Arc<dyn EventRecorder>,
    clock: Clock,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("config", &self.config)
            .field("handoffs", &self.handoffs.read().len())
            .finish()
    }
}

impl LocalStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            handoffs: RwLock::new(HashMap::new()),
            recorder: Arc::new(TracingRecorder),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.handoffs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handoffs.read().is_empty()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn record(&self, event: HandoffEvent) {
        self.recorder.record(&event);
    }

    fn validate_key(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::validation("Key must not be empty"));
        }
        let length = key.chars().count();
        if length > self.config.max_key_length {
            return Err(StorageError::validation(format!(
                "Key too long: {} characters (max {})",
                length, self.config.max_key_length
            )));
        }
        if !self.config.key_pattern.is_match(key) {
            return Err(StorageError::validation(format!(
                "Invalid key format: '{}'. Use only letters, numbers, hyphens and underscores",
                key
            )));
        }
        Ok(())
    }

    fn validate_title(&self, title: &str) -> StorageResult<()> {
        if title.trim().is_empty() {
            return Err(StorageError::validation("Title must not be empty"));
        }
        let length = title.chars().count();
        if length > self.config.max_title_length {
            return Err(StorageError::validation(format!(
                "Title too long: {} characters (max {})",
                length, self.config.max_title_length
            )));
        }
        Ok(())
    }

    fn validate_size(field: &str, value: &str, max_bytes: usize) -> StorageResult<()> {
        if value.len() > max_bytes {
            return Err(StorageError::validation(format!(
                "{} too large: {} bytes (max {})",
                field,
                value.len(),
                max_bytes
            )));
        }
        Ok(())
    }

    fn capacity_error(&self) -> StorageError {
        StorageError::validation(format!(
            "Storage full: {} handoffs stored and none can be evicted",
            self.config.max_handoffs
        ))
    }

    /// Evict one unprotected entry if the map is at capacity
    fn make_room(
        &self,
        handoffs: &mut HashMap<String, Handoff>,
        protected: &HashSet<&str>,
    ) -> StorageResult<Option<Handoff>> {
        if handoffs.len() < self.config.max_handoffs {
            return Ok(None);
        }
        let victim = oldest_unprotected(handoffs, protected).ok_or_else(|| self.capacity_error())?;
        debug!("Evicting oldest handoff '{}' to make room", victim);
        Ok(handoffs.remove(&victim))
    }

    /// Create or replace a handoff
    ///
    /// A new key arriving at capacity evicts the oldest record first, so the
    /// eviction stands even when the input then fails validation.
    pub fn save_handoff(&self, input: SaveInput) -> StorageResult<SaveOutcome> {
        let key = input.key.clone();
        let mut handoffs = self.handoffs.write();
        let updated = handoffs.contains_key(&key);
        let evicted = if !updated && handoffs.len() >= self.config.max_handoffs {
            oldest_unprotected(&handoffs, &HashSet::new()).and_then(|victim| {
                debug!("Evicting oldest handoff '{}' to make room", victim);
                handoffs.remove(&victim)
            })
        } else {
            None
        };
        if let Some(old) = &evicted {
            self.record(HandoffEvent::new(HandoffEventKind::Evicted, old.key.clone()));
        }

        self.validate_key(&input.key)?;
        self.validate_title(&input.title)?;
        Self::validate_size("Summary", &input.summary, self.config.max_summary_bytes)?;
        Self::validate_size(
            "Conversation",
            &input.conversation,
            self.config.max_conversation_bytes,
        )?;
        if !updated && handoffs.len() >= self.config.max_handoffs {
            return Err(self.capacity_error());
        }

        handoffs.insert(
            key.clone(),
            Handoff {
                key: input.key,
                title: input.title,
                summary: input.summary,
                conversation: input.conversation,
                from_ai: input.from_ai,
                from_project: input.from_project,
                created_at: self.now(),
            },
        );
        drop(handoffs);

        let evicted_key = evicted.map(|handoff| handoff.key);

        let mut message = if updated {
            self.record(HandoffEvent::new(HandoffEventKind::Updated, key.clone()));
            format!("Handoff updated: {}", key)
        } else {
            self.record(HandoffEvent::new(HandoffEventKind::Saved, key.clone()));
            format!("Handoff saved with key: {}", key)
        };
        if let Some(old) = &evicted_key {
            message.push_str(&format!(" (evicted oldest handoff: {})", old));
        }

        Ok(SaveOutcome {
            message,
            evicted: evicted_key,
        })
    }

    /// All handoffs without conversations, oldest first
    pub fn list_handoffs(&self) -> Vec<HandoffSummary> {
        let handoffs = self.handoffs.read();
        let mut summaries: Vec<HandoffSummary> =
            handoffs.values().map(HandoffSummary::from).collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        summaries
    }

    pub fn load_handoff(&self, key: &str, max_messages: Option<usize>) -> StorageResult<Handoff> {
        if let Some(max) = max_messages {
            if !MAX_MESSAGES_RANGE.contains(&max) {
                return Err(StorageError::validation(format!(
                    "max_messages must be between {} and {}",
                    MAX_MESSAGES_RANGE.start(),
                    MAX_MESSAGES_RANGE.end()
                )));
            }
        }

        let mut handoff = self
            .handoffs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))?;

        if let Some(max) = max_messages {
            handoff.conversation = truncate_messages(&handoff.conversation, max);
        }
        Ok(handoff)
    }

    pub fn delete_handoff(&self, key: &str) -> StorageResult<MessageResponse> {
        if self.handoffs.write().remove(key).is_none() {
            return Err(StorageError::not_found(key));
        }
        self.record(HandoffEvent::new(HandoffEventKind::Deleted, key));
        Ok(MessageResponse::new(format!("Handoff deleted: {}", key)))
    }

    pub fn clear(&self) -> ClearOutcome {
        let count = {
            let mut handoffs = self.handoffs.write();
            let count = handoffs.len();
            handoffs.clear();
            count
        };
        self.record(HandoffEvent {
            kind: HandoffEventKind::Cleared,
            key: None,
            detail: Some(format!("{} handoffs", count)),
        });
        ClearOutcome {
            message: format!("Deleted {} handoff(s)", count),
            count,
        }
    }

    pub fn stats_snapshot(&self) -> StoreStats {
        let handoffs = self.handoffs.read();
        let total_bytes = handoffs
            .values()
            .map(|h| h.title.len() + h.summary.len() + h.conversation.len())
            .sum();
        let usage_percent = if self.config.max_handoffs == 0 {
            0
        } else {
            (handoffs.len() * 100 / self.config.max_handoffs) as u32
        };

        StoreStats {
            current: UsageSnapshot {
                handoffs: handoffs.len(),
                total_bytes,
                usage_percent,
            },
            limits: LimitsSnapshot {
                max_handoffs: self.config.max_handoffs,
                max_conversation_bytes: self.config.max_conversation_bytes,
                max_summary_bytes: self.config.max_summary_bytes,
                max_title_length: self.config.max_title_length,
                max_key_length: self.config.max_key_length,
            },
        }
    }

    /// Merge two or more handoffs into a single new one
    ///
    /// All checks run before anything is removed or inserted, so a failed
    /// merge leaves the store untouched. When `delete_sources` is set the
    /// sources are removed first and their slots count as free; otherwise
    /// they are protected from the eviction that makes room for the result.
    pub fn merge_handoffs(&self, spec: MergeSpec) -> StorageResult<MergeOutcome> {
        if spec.keys.len() < 2 {
            return Err(StorageError::validation(
                "Merge requires at least 2 handoff keys",
            ));
        }
        let mut source_keys: HashSet<&str> = HashSet::new();
        for key in &spec.keys {
            if !source_keys.insert(key.as_str()) {
                return Err(StorageError::validation(format!(
                    "Duplicate key in merge request: {}",
                    key
                )));
            }
        }
        if let Some(key) = &spec.new_key {
            self.validate_key(key)?;
        }
        if let Some(title) = &spec.new_title {
            self.validate_title(title)?;
        }

        let now = self.now();
        let mut handoffs = self.handoffs.write();

        let mut sources: Vec<Handoff> = spec
            .keys
            .iter()
            .map(|key| {
                handoffs
                    .get(key)
                    .cloned()
                    .ok_or_else(|| StorageError::not_found(key))
            })
            .collect::<StorageResult<_>>()?;

        if spec.strategy == MergeStrategy::Chronological {
            sources.sort_by_key(|handoff| handoff.created_at);
        }
        let ordered: Vec<&Handoff> = sources.iter().collect();

        let conversation = merge::combine_conversations(&ordered);
        let summary = match &spec.new_summary {
            Some(summary) => summary.clone(),
            None => merge::digest_summary(&ordered, self.config.max_summary_bytes),
        };
        let title = match &spec.new_title {
            Some(title) => title.clone(),
            None => merge::default_title(&ordered, self.config.max_title_length),
        };
        let from_ai = merge::unify_values(ordered.iter().map(|h| h.from_ai.as_str()));
        let from_project = merge::unify_values(ordered.iter().map(|h| h.from_project.as_str()));

        Self::validate_size(
            "Merged conversation",
            &conversation,
            self.config.max_conversation_bytes,
        )?;
        Self::validate_size("Merged summary", &summary, self.config.max_summary_bytes)?;

        let merged_key = match &spec.new_key {
            Some(key) => key.clone(),
            None => {
                let key = generate_merge_key(&handoffs, now);
                self.validate_key(&key)?;
                key
            }
        };
        if handoffs.contains_key(&merged_key) {
            if !source_keys.contains(merged_key.as_str()) {
                return Err(StorageError::validation(format!(
                    "Key already exists: '{}'",
                    merged_key
                )));
            }
            if !spec.delete_sources {
                return Err(StorageError::validation(format!(
                    "Merged key '{}' is one of the sources; set delete_sources to replace it",
                    merged_key
                )));
            }
        }

        let freed = if spec.delete_sources { sources.len() } else { 0 };
        if handoffs.len() - freed >= self.config.max_handoffs
            && !handoffs
                .keys()
                .any(|key| !source_keys.contains(key.as_str()))
        {
            return Err(self.capacity_error());
        }

        // Nothing below can fail.
        if spec.delete_sources {
            for key in &spec.keys {
                handoffs.remove(key);
            }
        }
        let protected = if spec.delete_sources {
            HashSet::new()
        } else {
            source_keys.clone()
        };
        let evicted = self.make_room(&mut handoffs, &protected)?;

        handoffs.insert(
            merged_key.clone(),
            Handoff {
                key: merged_key.clone(),
                title,
                summary,
                conversation,
                from_ai,
                from_project,
                created_at: now,
            },
        );
        drop(handoffs);

        if let Some(old) = evicted {
            self.record(HandoffEvent::new(HandoffEventKind::Evicted, old.key));
        }
        if spec.delete_sources {
            for key in spec.keys.iter().filter(|key| **key != merged_key) {
                self.record(HandoffEvent::new(HandoffEventKind::Deleted, key.clone()));
            }
        }
        self.record(
            HandoffEvent::new(HandoffEventKind::Merged, merged_key.clone())
                .with_detail(spec.keys.join(", ")),
        );

        let source_count = spec.keys.len();
        let mut message = format!("Merged {} handoffs into '{}'", source_count, merged_key);
        if spec.delete_sources {
            message.push_str(" (source handoffs deleted)");
        }

        Ok(MergeOutcome {
            message,
            merged_key,
            source_count,
            deleted_sources: spec.delete_sources,
        })
    }
}

/// Key of the oldest entry not in `protected`; ties go to the smaller key
fn oldest_unprotected(
    handoffs: &HashMap<String, Handoff>,
    protected: &HashSet<&str>,
) -> Option<String> {
    handoffs
        .values()
        .filter(|handoff| !protected.contains(handoff.key.as_str()))
        .min_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.cmp(&b.key))
        })
        .map(|handoff| handoff.key.clone())
}

fn generate_merge_key(handoffs: &HashMap<String, Handoff>, now: DateTime<Utc>) -> String {
    let base = format!("merged-{}", now.format("%Y%m%d%H%M%S"));
    if !handoffs.contains_key(&base) {
        return base;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !handoffs.contains_key(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[async_trait]
impl HandoffStore for LocalStore {
    async fn save(&self, input: SaveInput) -> StorageResult<SaveOutcome> {
        self.save_handoff(input)
    }

    async fn list(&self) -> StorageResult<Vec<HandoffSummary>> {
        Ok(self.list_handoffs())
    }

    async fn load(&self, key: &str, max_messages: Option<usize>) -> StorageResult<Handoff> {
        self.load_handoff(key, max_messages)
    }

    async fn delete(&self, key: &str) -> StorageResult<MessageResponse> {
        self.delete_handoff(key)
    }

    async fn delete_all(&self) -> StorageResult<ClearOutcome> {
        Ok(self.clear())
    }

    async fn stats(&self) -> StorageResult<StoreStats> {
        Ok(self.stats_snapshot())
    }

    async fn merge(&self, spec: MergeSpec) -> StorageResult<MergeOutcome> {
        self.merge_handoffs(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that advances ten seconds on every reading
    fn stepping_clock() -> Clock {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let tick = AtomicI64::new(0);
        Arc::new(move || base + Duration::seconds(10 * tick.fetch_add(1, Ordering::SeqCst)))
    }

    fn store(capacity: usize) -> LocalStore {
        LocalStore::new(Config::default().with_max_handoffs(capacity)).with_clock(stepping_clock())
    }

    fn input(key: &str) -> SaveInput {
        SaveInput::new(
            key,
            format!("Title {}", key),
            format!("Summary of {}", key),
            format!("## User\nquestion {}\n\n## Assistant\nanswer {}\n", key, key),
        )
    }

    #[derive(Default)]
    struct RecordingRecorder {
        events: Mutex<Vec<HandoffEvent>>,
    }

    impl EventRecorder for RecordingRecorder {
        fn record(&self, event: &HandoffEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn keys(store: &LocalStore) -> Vec<String> {
        store.list_handoffs().into_iter().map(|h| h.key).collect()
    }

    #[test]
    fn test_fifo_evicts_oldest_at_capacity() {
        let store = store(10);
        for i in 0..10 {
            store.save_handoff(input(&format!("h{}", i))).unwrap();
        }
        let outcome = store.save_handoff(input("h10")).unwrap();

        assert_eq!(outcome.evicted.as_deref(), Some("h0"));
        assert!(outcome.message.contains("evicted oldest handoff: h0"));
        let expected: Vec<String> = (1..=10).map(|i| format!("h{}", i)).collect();
        assert_eq!(keys(&store), expected);
    }

    #[test]
    fn test_update_at_capacity_does_not_evict() {
        let store = store(3);
        for key in ["a", "b", "c"] {
            store.save_handoff(input(key)).unwrap();
        }
        let outcome = store
            .save_handoff(input("a").from_project("changed"))
            .unwrap();

        assert!(outcome.evicted.is_none());
        assert!(outcome.message.starts_with("Handoff updated"));
        assert_eq!(store.len(), 3);
        assert_eq!(store.load_handoff("a", None).unwrap().from_project, "changed");
    }

    #[test]
    fn test_updated_record_becomes_newest() {
        let store = store(3);
        for key in ["a", "b", "c"] {
            store.save_handoff(input(key)).unwrap();
        }
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("d")).unwrap();
        assert_eq!(keys(&store), vec!["c", "a", "d"]);
    }

    #[test]
    fn test_validation_order_and_messages() {
        let store = LocalStore::new(
            Config::default()
                .with_max_summary_bytes(10)
                .with_max_conversation_bytes(20),
        );

        let err = store.save_handoff(input("bad key")).unwrap_err();
        assert!(err.to_string().contains("Invalid key format"));

        let err = store
            .save_handoff(SaveInput::new("ok", "", "s", "c"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Title must not be empty");

        // Key is checked before title
        let err = store
            .save_handoff(SaveInput::new("", "", "s", "c"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Key must not be empty");

        let err = store
            .save_handoff(SaveInput::new("ok", "t", "x".repeat(11), "y".repeat(21)))
            .unwrap_err();
        assert!(err.to_string().starts_with("Summary too large: 11 bytes"));

        let err = store
            .save_handoff(SaveInput::new("ok", "t", "s", "y".repeat(21)))
            .unwrap_err();
        assert!(err.to_string().starts_with("Conversation too large: 21 bytes"));

        let long_key = "k".repeat(101);
        let err = store
            .save_handoff(SaveInput::new(long_key, "t", "s", "c"))
            .unwrap_err();
        assert!(err.to_string().starts_with("Key too long"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_new_key_at_capacity_evicts_before_validation() {
        let store = store(2);
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();
        let err = store.save_handoff(SaveInput::new("c", "", "s", "c")).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
        assert_eq!(keys(&store), vec!["b"]);

        // Existing key at capacity: nothing evicted even when invalid
        store.save_handoff(input("c")).unwrap();
        assert!(store.save_handoff(SaveInput::new("b", "", "s", "c")).is_err());
        assert_eq!(keys(&store), vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_rejects_new_keys() {
        let store = store(0);
        let err = store.save_handoff(input("a")).unwrap_err();
        assert!(err.to_string().starts_with("Storage full"));
    }

    #[test]
    fn test_eviction_skips_protected_keys() {
        let store = store(3);
        for key in ["a", "b", "c"] {
            store.save_handoff(input(key)).unwrap();
        }
        let protected: HashSet<&str> = ["a"].into_iter().collect();
        let evicted = {
            let mut handoffs = store.handoffs.write();
            store.make_room(&mut handoffs, &protected).unwrap()
        };
        assert_eq!(evicted.unwrap().key, "b");
    }

    #[test]
    fn test_load_with_max_messages() {
        let store = store(5);
        store.save_handoff(input("a")).unwrap();

        let full = store.load_handoff("a", None).unwrap();
        assert!(full.conversation.contains("question a"));

        let last = store.load_handoff("a", Some(1)).unwrap();
        assert!(last.conversation.contains("answer a"));
        assert!(!last.conversation.contains("question a"));

        assert!(matches!(
            store.load_handoff("a", Some(0)),
            Err(StorageError::Validation(_))
        ));
        assert!(matches!(
            store.load_handoff("a", Some(10_001)),
            Err(StorageError::Validation(_))
        ));
        assert!(matches!(
            store.load_handoff("missing", None),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_and_clear() {
        let store = store(5);
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();

        store.delete_handoff("a").unwrap();
        assert!(matches!(
            store.delete_handoff("a"),
            Err(StorageError::NotFound(_))
        ));

        let outcome = store.clear();
        assert_eq!(outcome.count, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stats_snapshot() {
        let store = store(4);
        store
            .save_handoff(SaveInput::new("a", "tt", "sss", "cccc"))
            .unwrap();
        let stats = store.stats_snapshot();
        assert_eq!(stats.current.handoffs, 1);
        assert_eq!(stats.current.total_bytes, 9);
        assert_eq!(stats.current.usage_percent, 25);
        assert_eq!(stats.limits.max_handoffs, 4);
    }

    #[test]
    fn test_merge_chronological_keeps_sources() {
        let store = store(10);
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();

        let outcome = store
            .merge_handoffs(MergeSpec::new(["b", "a"]).new_key("ab"))
            .unwrap();
        assert_eq!(outcome.merged_key, "ab");
        assert_eq!(outcome.source_count, 2);
        assert!(!outcome.deleted_sources);

        let merged = store.load_handoff("ab", None).unwrap();
        let a_at = merged.conversation.find("[Merged from: a]").unwrap();
        let b_at = merged.conversation.find("[Merged from: b]").unwrap();
        assert!(a_at < b_at);
        assert!(store.load_handoff("a", None).is_ok());
        assert!(store.load_handoff("b", None).is_ok());
    }

    #[test]
    fn test_merge_sequential_uses_input_order() {
        let store = store(10);
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();

        store
            .merge_handoffs(
                MergeSpec::new(["b", "a"])
                    .new_key("ba")
                    .strategy(MergeStrategy::Sequential),
            )
            .unwrap();
        let merged = store.load_handoff("ba", None).unwrap();
        let a_at = merged.conversation.find("[Merged from: a]").unwrap();
        let b_at = merged.conversation.find("[Merged from: b]").unwrap();
        assert!(b_at < a_at);
    }

    #[test]
    fn test_merge_unifies_origins_and_summarises() {
        let store = store(10);
        store
            .save_handoff(input("a").from_ai("claude").from_project("p1"))
            .unwrap();
        store
            .save_handoff(input("b").from_ai("claude").from_project("p2"))
            .unwrap();

        let outcome = store.merge_handoffs(MergeSpec::new(["a", "b"])).unwrap();
        assert!(outcome.merged_key.starts_with("merged-"));

        let merged = store.load_handoff(&outcome.merged_key, None).unwrap();
        assert_eq!(merged.from_ai, "claude");
        assert_eq!(merged.from_project, "p1, p2");
        assert_eq!(
            merged.summary,
            "Merged from 2 handoffs:\n- [a] Summary of a\n- [b] Summary of b"
        );
        assert_eq!(merged.title, "Merged: Title a + Title b");
    }

    #[test]
    fn test_merge_summary_truncated_with_ellipsis() {
        let store = LocalStore::new(Config::default().with_max_summary_bytes(30))
            .with_clock(stepping_clock());
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();

        let outcome = store.merge_handoffs(MergeSpec::new(["a", "b"])).unwrap();
        let merged = store.load_handoff(&outcome.merged_key, None).unwrap();
        assert!(merged.summary.len() <= 30);
        assert!(merged.summary.ends_with("..."));
    }

    #[test]
    fn test_merge_failures_leave_store_unchanged() {
        let store = LocalStore::new(
            Config::default()
                .with_max_handoffs(10)
                .with_max_conversation_bytes(150),
        )
        .with_clock(stepping_clock());
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();
        store.save_handoff(input("c")).unwrap();
        let before = store.list_handoffs();

        let err = store.merge_handoffs(MergeSpec::new(["a", "a"])).unwrap_err();
        assert!(err.to_string().contains("Duplicate key"));

        let err = store
            .merge_handoffs(MergeSpec::new(["a", "missing"]))
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err = store.merge_handoffs(MergeSpec::new(["a"])).unwrap_err();
        assert!(err.to_string().contains("at least 2"));

        let err = store
            .merge_handoffs(MergeSpec::new(["a", "b", "c"]).delete_sources(true))
            .unwrap_err();
        assert!(err.to_string().starts_with("Merged conversation too large"));

        let err = store
            .merge_handoffs(
                MergeSpec::new(["a", "b"])
                    .new_summary("x".repeat(20_000))
                    .delete_sources(true),
            )
            .unwrap_err();
        assert!(err.to_string().starts_with("Merged summary too large"));

        assert_eq!(store.list_handoffs(), before);
    }

    #[test]
    fn test_merge_key_collisions() {
        let store = store(10);
        for key in ["a", "b", "c"] {
            store.save_handoff(input(key)).unwrap();
        }

        let err = store
            .merge_handoffs(MergeSpec::new(["a", "b"]).new_key("c"))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let err = store
            .merge_handoffs(MergeSpec::new(["a", "b"]).new_key("a"))
            .unwrap_err();
        assert!(err.to_string().contains("set delete_sources"));

        store
            .merge_handoffs(MergeSpec::new(["a", "b"]).new_key("a").delete_sources(true))
            .unwrap();
        assert_eq!(keys(&store), vec!["c", "a"]);
        assert!(store
            .load_handoff("a", None)
            .unwrap()
            .conversation
            .contains("[Merged from: b]"));
    }

    #[test]
    fn test_merge_delete_sources_frees_slots() {
        let store = store(3);
        for key in ["a", "b", "c"] {
            store.save_handoff(input(key)).unwrap();
        }
        let outcome = store
            .merge_handoffs(MergeSpec::new(["b", "c"]).new_key("bc").delete_sources(true))
            .unwrap();
        assert!(outcome.deleted_sources);
        assert_eq!(keys(&store), vec!["a", "bc"]);
    }

    #[test]
    fn test_merge_protects_kept_sources_from_eviction() {
        let store = store(3);
        for key in ["a", "b", "c"] {
            store.save_handoff(input(key)).unwrap();
        }
        store
            .merge_handoffs(MergeSpec::new(["a", "b"]).new_key("ab"))
            .unwrap();
        assert_eq!(keys(&store), vec!["a", "b", "ab"]);
    }

    #[test]
    fn test_merge_fails_when_only_sources_could_be_evicted() {
        let store = store(2);
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();

        let err = store
            .merge_handoffs(MergeSpec::new(["a", "b"]).new_key("ab"))
            .unwrap_err();
        assert!(err.to_string().starts_with("Storage full"));
        assert_eq!(keys(&store), vec!["a", "b"]);
    }

    #[test]
    fn test_events_are_recorded() {
        let recorder = Arc::new(RecordingRecorder::default());
        let store = store(1).with_recorder(recorder.clone());
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("a")).unwrap();
        store.save_handoff(input("b")).unwrap();
        store.delete_handoff("b").unwrap();

        let kinds: Vec<HandoffEventKind> =
            recorder.events.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                HandoffEventKind::Saved,
                HandoffEventKind::Updated,
                HandoffEventKind::Evicted,
                HandoffEventKind::Saved,
                HandoffEventKind::Deleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_trait_object_roundtrip() {
        let store: Arc<dyn HandoffStore> = Arc::new(store(5));
        store.save(input("a")).await.unwrap();
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.load("a", None).await.unwrap().key, "a");
        assert_eq!(store.delete_all().await.unwrap().count, 1);
    }
}
