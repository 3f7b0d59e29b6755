//! Repository traits for the four persisted record kinds

use async_trait::async_trait;
use spamwall_core::{
    BanRecord, BatchAccumulator, ClassifierState, ExampleId, Label, NewExample, Provenance,
    Result, ScopeId, Target, TrainingExample,
};

/// Persisted classifier counters, unique per scope
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, scope: ScopeId) -> Result<Option<ClassifierState>>;

    /// Insert `state` unless one exists for its scope; returns whichever is stored.
    async fn insert_state_if_absent(&self, state: ClassifierState) -> Result<ClassifierState>;

    /// Replace the stored state in a single write, stamping `updated_at`.
    async fn put_state(&self, state: ClassifierState) -> Result<()>;

    /// Public content template: the most recently updated content scope
    /// other than `exclude`. `None` when no such scope exists.
    async fn latest_content_state(&self, exclude: ScopeId) -> Result<Option<ClassifierState>>;

    async fn list_states(&self) -> Result<Vec<ClassifierState>>;
}

/// Spam-family versus ham-family example counts for one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilyCounts {
    /// `spam` + `maybe_spam`
    pub spam: usize,
    /// `ham` + `maybe_ham`
    pub ham: usize,
}

/// Append-mostly log of judged texts
#[async_trait]
pub trait ExampleStore: Send + Sync {
    async fn insert_example(&self, example: NewExample) -> Result<TrainingExample>;

    async fn get_example(&self, id: ExampleId) -> Result<Option<TrainingExample>>;

    /// Set the label of one example, returning the previous label and the updated record.
    async fn update_label(
        &self,
        id: ExampleId,
        label: Label,
        provenance: Provenance,
    ) -> Result<(Label, TrainingExample)>;

    /// Memo precedent for a fingerprint: latest `updated_at` wins, ties go to the highest id.
    async fn latest_by_fingerprint(&self, fingerprint: &str) -> Result<Option<TrainingExample>>;

    /// Every example sharing a fingerprint, oldest first
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<TrainingExample>>;

    /// Examples with a decisive label for `target`, oldest first, optionally limited to one scope
    async fn trainable_examples(
        &self,
        target: Target,
        scope: Option<ScopeId>,
    ) -> Result<Vec<TrainingExample>>;

    async fn family_counts(&self, target: Target) -> Result<FamilyCounts>;

    /// Examples from one sender in one scope carrying exactly `label`
    async fn sender_examples(
        &self,
        scope: ScopeId,
        sender_id: i64,
        label: Label,
    ) -> Result<Vec<TrainingExample>>;
}

/// Active bans, at most one per (scope, sender)
#[async_trait]
pub trait BanStore: Send + Sync {
    async fn get_ban(&self, scope: ScopeId, sender_id: i64) -> Result<Option<BanRecord>>;

    /// Returns `false` when a ban for the pair already exists.
    async fn insert_ban(&self, ban: BanRecord) -> Result<bool>;

    async fn remove_ban(&self, scope: ScopeId, sender_id: i64) -> Result<Option<BanRecord>>;

    async fn list_bans(&self, scope: ScopeId) -> Result<Vec<BanRecord>>;
}

/// Batch accumulators, unique per key
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn get_batch(&self, key: &str) -> Result<Option<BatchAccumulator>>;

    async fn put_batch(&self, batch: BatchAccumulator) -> Result<()>;

    /// Keys of accumulators with `pending_count > 0`
    async fn pending_batch_keys(&self) -> Result<Vec<String>>;
}
