//! In-memory implementation of every repository trait

use crate::repository::{BanStore, BatchStore, ExampleStore, FamilyCounts, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use spamwall_core::{
    BanRecord, BatchAccumulator, ClassifierState, Error, ExampleId, Label, LabelFamily,
    NewExample, Provenance, Result, ScopeId, Target, TrainingExample,
};
use std::collections::{BTreeMap, HashMap};

/// Thread-safe in-memory store.
///
/// Each call takes the lock once, so every single-record write is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    states: HashMap<ScopeId, ClassifierState>,
    examples: BTreeMap<ExampleId, TrainingExample>,
    by_fingerprint: HashMap<String, Vec<ExampleId>>,
    bans: HashMap<(ScopeId, i64), BanRecord>,
    batches: HashMap<String, BatchAccumulator>,
    next_example_id: u64,
    last_write: Option<DateTime<Utc>>,
}

impl Inner {
    /// Write timestamp, strictly increasing so recency ordering never ties
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_write {
            if now <= last {
                now = last + Duration::nanoseconds(1);
            }
        }
        self.last_write = Some(now);
        now
    }
}

/// Serializable copy of a [`MemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub states: Vec<ClassifierState>,
    #[serde(default)]
    pub examples: Vec<TrainingExample>,
    #[serde(default)]
    pub bans: Vec<BanRecord>,
    #[serde(default)]
    pub batches: Vec<BatchAccumulator>,
    #[serde(default)]
    pub next_example_id: u64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store, including its fingerprint index, from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut inner = Inner::default();
        let max_id = snapshot.examples.iter().map(|e| e.id.0).max().unwrap_or(0);
        inner.next_example_id = snapshot.next_example_id.max(max_id);

        for state in snapshot.states {
            inner.states.insert(state.scope, state);
        }
        for example in snapshot.examples {
            inner
                .by_fingerprint
                .entry(example.fingerprint.clone())
                .or_default()
                .push(example.id);
            inner.examples.insert(example.id, example);
        }
        for ban in snapshot.bans {
            inner.bans.insert((ban.scope, ban.sender.id), ban);
        }
        for batch in snapshot.batches {
            inner.batches.insert(batch.key.clone(), batch);
        }

        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Copy the whole store out
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        let mut states: Vec<_> = inner.states.values().cloned().collect();
        states.sort_by_key(|s| s.scope);
        let mut batches: Vec<_> = inner.batches.values().cloned().collect();
        batches.sort_by(|a, b| a.key.cmp(&b.key));
        let mut bans: Vec<_> = inner.bans.values().cloned().collect();
        bans.sort_by_key(|b| (b.scope, b.sender.id));

        StoreSnapshot {
            states,
            examples: inner.examples.values().cloned().collect(),
            bans,
            batches,
            next_example_id: inner.next_example_id,
        }
    }

    pub fn example_count(&self) -> usize {
        self.inner.read().examples.len()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_state(&self, scope: ScopeId) -> Result<Option<ClassifierState>> {
        Ok(self.inner.read().states.get(&scope).cloned())
    }

    async fn insert_state_if_absent(&self, state: ClassifierState) -> Result<ClassifierState> {
        let mut inner = self.inner.write();
        let stored = inner.states.entry(state.scope).or_insert(state);
        Ok(stored.clone())
    }

    async fn put_state(&self, mut state: ClassifierState) -> Result<()> {
        let mut inner = self.inner.write();
        state.updated_at = inner.tick();
        inner.states.insert(state.scope, state);
        Ok(())
    }

    async fn latest_content_state(&self, exclude: ScopeId) -> Result<Option<ClassifierState>> {
        let inner = self.inner.read();
        Ok(inner
            .states
            .values()
            .filter(|s| s.target == Target::Content && s.scope != exclude)
            .max_by(|a, b| {
                a.updated_at
                    .cmp(&b.updated_at)
                    .then_with(|| a.scope.cmp(&b.scope))
            })
            .cloned())
    }

    async fn list_states(&self) -> Result<Vec<ClassifierState>> {
        let mut states: Vec<_> = self.inner.read().states.values().cloned().collect();
        states.sort_by_key(|s| s.scope);
        Ok(states)
    }
}

#[async_trait]
impl ExampleStore for MemoryStore {
    async fn insert_example(&self, example: NewExample) -> Result<TrainingExample> {
        let mut inner = self.inner.write();
        inner.next_example_id += 1;
        let id = ExampleId(inner.next_example_id);
        let now = inner.tick();
        let example = example.into_example(id, now);

        inner
            .by_fingerprint
            .entry(example.fingerprint.clone())
            .or_default()
            .push(id);
        inner.examples.insert(id, example.clone());
        Ok(example)
    }

    async fn get_example(&self, id: ExampleId) -> Result<Option<TrainingExample>> {
        Ok(self.inner.read().examples.get(&id).cloned())
    }

    async fn update_label(
        &self,
        id: ExampleId,
        label: Label,
        provenance: Provenance,
    ) -> Result<(Label, TrainingExample)> {
        let mut inner = self.inner.write();
        let now = inner.tick();
        let example = inner
            .examples
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("training example {}", id)))?;

        let previous = example.label;
        example.label = label;
        example.provenance = provenance;
        example.updated_at = now;
        Ok((previous, example.clone()))
    }

    async fn latest_by_fingerprint(&self, fingerprint: &str) -> Result<Option<TrainingExample>> {
        let inner = self.inner.read();
        let Some(ids) = inner.by_fingerprint.get(fingerprint) else {
            return Ok(None);
        };

        Ok(ids
            .iter()
            .filter_map(|id| inner.examples.get(id))
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<TrainingExample>> {
        let inner = self.inner.read();
        Ok(inner
            .by_fingerprint
            .get(fingerprint)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.examples.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn trainable_examples(
        &self,
        target: Target,
        scope: Option<ScopeId>,
    ) -> Result<Vec<TrainingExample>> {
        let inner = self.inner.read();
        Ok(inner
            .examples
            .values()
            .filter(|e| e.target == target && e.label.is_trainable())
            .filter(|e| scope.map_or(true, |s| e.scope == s))
            .cloned()
            .collect())
    }

    async fn family_counts(&self, target: Target) -> Result<FamilyCounts> {
        let inner = self.inner.read();
        let mut counts = FamilyCounts::default();
        for example in inner.examples.values().filter(|e| e.target == target) {
            match example.label.family() {
                LabelFamily::Spam => counts.spam += 1,
                LabelFamily::Ham => counts.ham += 1,
                LabelFamily::Untrained => {}
            }
        }
        Ok(counts)
    }

    async fn sender_examples(
        &self,
        scope: ScopeId,
        sender_id: i64,
        label: Label,
    ) -> Result<Vec<TrainingExample>> {
        let inner = self.inner.read();
        Ok(inner
            .examples
            .values()
            .filter(|e| e.scope == scope && e.sender.id == sender_id && e.label == label)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BanStore for MemoryStore {
    async fn get_ban(&self, scope: ScopeId, sender_id: i64) -> Result<Option<BanRecord>> {
        Ok(self.inner.read().bans.get(&(scope, sender_id)).cloned())
    }

    async fn insert_ban(&self, ban: BanRecord) -> Result<bool> {
        let mut inner = self.inner.write();
        let key = (ban.scope, ban.sender.id);
        if inner.bans.contains_key(&key) {
            return Ok(false);
        }
        inner.bans.insert(key, ban);
        Ok(true)
    }

    async fn remove_ban(&self, scope: ScopeId, sender_id: i64) -> Result<Option<BanRecord>> {
        Ok(self.inner.write().bans.remove(&(scope, sender_id)))
    }

    async fn list_bans(&self, scope: ScopeId) -> Result<Vec<BanRecord>> {
        let inner = self.inner.read();
        let mut bans: Vec<_> = inner
            .bans
            .values()
            .filter(|b| b.scope == scope)
            .cloned()
            .collect();
        bans.sort_by_key(|b| b.banned_at);
        Ok(bans)
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn get_batch(&self, key: &str) -> Result<Option<BatchAccumulator>> {
        Ok(self.inner.read().batches.get(key).cloned())
    }

    async fn put_batch(&self, batch: BatchAccumulator) -> Result<()> {
        self.inner.write().batches.insert(batch.key.clone(), batch);
        Ok(())
    }

    async fn pending_batch_keys(&self) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let mut keys: Vec<_> = inner
            .batches
            .values()
            .filter(|b| b.pending_count > 0)
            .map(|b| b.key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spamwall_core::SenderSnapshot;

    fn content(text: &str, label: Label) -> NewExample {
        NewExample::new(ScopeId(-10), Target::Content, text, label)
    }

    #[tokio::test]
    async fn test_list_states_orders_by_scope() {
        let store = MemoryStore::new();
        for scope in [-5, 0, -20] {
            store
                .put_state(ClassifierState::empty(ScopeId(scope), "g", Target::Content))
                .await
                .unwrap();
        }

        let scopes: Vec<ScopeId> = store.list_states().await.unwrap().iter().map(|s| s.scope).collect();
        assert_eq!(scopes, vec![ScopeId(-20), ScopeId(-5), ScopeId(0)]);
    }

    #[tokio::test]
    async fn test_insert_assigns_monotonic_ids() {
        let store = MemoryStore::new();
        let a = store.insert_example(content("one", Label::Spam)).await.unwrap();
        let b = store.insert_example(content("two", Label::Ham)).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.example_count(), 2);
    }

    #[tokio::test]
    async fn test_latest_by_fingerprint_prefers_most_recent_label() {
        let store = MemoryStore::new();
        let first = store.insert_example(content("promo", Label::Spam)).await.unwrap();
        store.insert_example(content("promo", Label::Untrained)).await.unwrap();

        let latest = store.latest_by_fingerprint(&first.fingerprint).await.unwrap().unwrap();
        assert_eq!(latest.label, Label::Untrained);

        store
            .update_label(first.id, Label::Ham, Provenance::GroupAdmin)
            .await
            .unwrap();
        let latest = store.latest_by_fingerprint(&first.fingerprint).await.unwrap().unwrap();
        assert_eq!(latest.id, first.id);
        assert_eq!(latest.label, Label::Ham);
    }

    #[tokio::test]
    async fn test_insert_state_if_absent_keeps_existing() {
        let store = MemoryStore::new();
        let mut original = ClassifierState::empty(ScopeId(-1), "first", Target::Content);
        original.total_spam_messages = 4;
        store.insert_state_if_absent(original).await.unwrap();

        let stored = store
            .insert_state_if_absent(ClassifierState::empty(ScopeId(-1), "second", Target::Content))
            .await
            .unwrap();
        assert_eq!(stored.display_name, "first");
        assert_eq!(stored.total_spam_messages, 4);
    }

    #[tokio::test]
    async fn test_latest_content_state_skips_username_scope_and_excluded() {
        let store = MemoryStore::new();
        store
            .put_state(ClassifierState::empty(ScopeId(-1), "older", Target::Content))
            .await
            .unwrap();
        store
            .put_state(ClassifierState::empty(ScopeId(-2), "newer", Target::Content))
            .await
            .unwrap();
        store
            .put_state(ClassifierState::empty(ScopeId(0), "names", Target::Username))
            .await
            .unwrap();

        let template = store.latest_content_state(ScopeId(-3)).await.unwrap().unwrap();
        assert_eq!(template.scope, ScopeId(-2));

        let template = store.latest_content_state(ScopeId(-2)).await.unwrap().unwrap();
        assert_eq!(template.scope, ScopeId(-1));

        let empty = MemoryStore::new();
        assert!(empty.latest_content_state(ScopeId(-1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_family_counts_group_tentative_labels() {
        let store = MemoryStore::new();
        store.insert_example(content("a", Label::Spam)).await.unwrap();
        store.insert_example(content("b", Label::MaybeSpam)).await.unwrap();
        store.insert_example(content("c", Label::MaybeHam)).await.unwrap();
        store.insert_example(content("d", Label::Untrained)).await.unwrap();

        let counts = store.family_counts(Target::Content).await.unwrap();
        assert_eq!(counts, FamilyCounts { spam: 2, ham: 1 });
        assert_eq!(store.family_counts(Target::Username).await.unwrap(), FamilyCounts::default());
    }

    #[tokio::test]
    async fn test_ban_is_unique_per_pair() {
        let store = MemoryStore::new();
        let ban = BanRecord {
            scope: ScopeId(-1),
            scope_name: None,
            sender: SenderSnapshot::new(9, "spammer"),
            spam_text: "buy".to_string(),
            message_id: 1,
            banned_at: Utc::now(),
        };
        assert!(store.insert_ban(ban.clone()).await.unwrap());
        assert!(!store.insert_ban(ban).await.unwrap());
        assert!(store.remove_ban(ScopeId(-1), 9).await.unwrap().is_some());
        assert!(store.get_ban(ScopeId(-1), 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_label_on_missing_example_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_label(ExampleId(99), Label::Spam, Provenance::GroupAdmin)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
