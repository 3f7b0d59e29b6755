//! Moderation and debounced training against the in-memory store

use spamwall_classifiers::{build_engine_from_config, ClassifierConfig, ClassifierEngine};
use spamwall_core::{
    Label, NewExample, Provenance, ScopeId, SenderSnapshot, Target, TrainingExample,
};
use spamwall_store::{BanStore, BatchStore, ExampleStore, MemoryStore, StateStore};
use spamwall_training::{
    training_batch_key, BatchDebouncer, BatchSettings, JobQueue, JobRunner, LabelService,
    ModerationSettings, RebuildClassifierJob, TrainingScheduler,
};
use std::sync::Arc;

const GROUP: ScopeId = ScopeId(-1001);

struct Harness {
    store: Arc<MemoryStore>,
    engine: ClassifierEngine,
    labels: LabelService,
    runner: JobRunner,
}

fn harness(batch_size: usize, inline_training: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mut config = ClassifierConfig::default();
    config.bayes.spam_threshold = 0.6;
    let engine = build_engine_from_config(&config, store.clone(), store.clone()).unwrap();

    let (queue, receiver) = JobQueue::new();
    let debouncer = Arc::new(BatchDebouncer::new(store.clone(), Arc::new(queue)));
    let batching = BatchSettings {
        batch_size,
        ..Default::default()
    };
    let scheduler = Arc::new(TrainingScheduler::new(
        debouncer,
        engine.classifier.clone(),
        batching,
    ));
    let labels = LabelService::new(
        store.clone(),
        store.clone(),
        scheduler,
        engine.classifier.clone(),
        ModerationSettings {
            ban_threshold: 3,
            inline_training,
        },
    );
    let runner =
        JobRunner::new(receiver).register(Arc::new(RebuildClassifierJob::new(engine.classifier.clone())));

    Harness {
        store,
        engine,
        labels,
        runner,
    }
}

fn spammer() -> SenderSnapshot {
    SenderSnapshot::new(42, "Lucky").with_last_name("Airdrop")
}

async fn insert(
    store: &MemoryStore,
    scope: ScopeId,
    text: &str,
    label: Label,
    sender: SenderSnapshot,
) -> TrainingExample {
    store
        .insert_example(
            NewExample::new(scope, Target::Content, text, label)
                .with_sender(sender)
                .with_message_id(1),
        )
        .await
        .unwrap()
}

async fn pending(store: &MemoryStore, scope: ScopeId) -> usize {
    store
        .get_batch(&training_batch_key(scope))
        .await
        .unwrap()
        .map_or(0, |batch| batch.pending_count)
}

#[tokio::test]
async fn test_third_confident_spam_bans_the_sender() {
    let h = harness(100, false);

    for (i, text) in ["spam one", "spam two"].iter().enumerate() {
        let example = insert(&h.store, GROUP, text, Label::Spam, spammer()).await;
        assert!(h.labels.record_created(&example).await.unwrap().is_none(), "message {}", i);
    }

    let third = insert(&h.store, GROUP, "spam three", Label::Spam, spammer()).await;
    let ban = h.labels.record_created(&third).await.unwrap().expect("ban");
    assert_eq!(ban.scope, GROUP);
    assert_eq!(ban.sender.id, 42);
    assert_eq!(ban.spam_text, "spam three");
    assert!(h.store.get_ban(GROUP, 42).await.unwrap().is_some());

    // Already banned: no second record
    let fourth = insert(&h.store, GROUP, "spam four", Label::Spam, spammer()).await;
    assert!(h.labels.record_created(&fourth).await.unwrap().is_none());
    assert_eq!(h.labels.bans(GROUP).await.unwrap().len(), 1);

    // Counts are per scope
    let elsewhere = insert(&h.store, ScopeId(-2002), "spam one", Label::Spam, spammer()).await;
    assert!(h.labels.record_created(&elsewhere).await.unwrap().is_none());
}

#[tokio::test]
async fn test_tentative_examples_neither_train_nor_ban() {
    let h = harness(100, false);

    for text in ["a", "b", "c", "d"] {
        let example = insert(&h.store, GROUP, text, Label::MaybeSpam, spammer()).await;
        assert!(h.labels.record_created(&example).await.unwrap().is_none());
    }

    assert_eq!(pending(&h.store, GROUP).await, 0);
    assert!(h.store.get_ban(GROUP, 42).await.unwrap().is_none());
}

#[tokio::test]
async fn test_relabel_enqueues_only_when_training_changes() {
    let h = harness(100, false);
    let example = insert(&h.store, GROUP, "hello", Label::MaybeSpam, spammer()).await;

    // Within the spam family: no retrain
    let outcome = h
        .labels
        .relabel(example.id, Label::Spam, Provenance::GroupAdmin)
        .await
        .unwrap();
    assert_eq!(outcome.previous, Label::MaybeSpam);
    assert_eq!(outcome.enqueued, 0);
    assert_eq!(pending(&h.store, GROUP).await, 0);

    // Spam to ham flips the class
    let outcome = h
        .labels
        .relabel(example.id, Label::Ham, Provenance::AdminDashboard)
        .await
        .unwrap();
    assert_eq!(outcome.enqueued, 1);
    assert_eq!(outcome.example.provenance, Provenance::AdminDashboard);
    assert_eq!(pending(&h.store, GROUP).await, 1);
}

#[tokio::test]
async fn test_relabel_syncs_same_text() {
    let h = harness(100, false);
    let sender = SenderSnapshot::new(7, "Ann");

    let first = insert(&h.store, GROUP, "buy now", Label::Untrained, sender.clone()).await;
    let maybe = insert(&h.store, ScopeId(-2002), "buy now", Label::MaybeSpam, sender.clone()).await;
    let ham = insert(&h.store, GROUP, "buy now", Label::Ham, sender.clone()).await;
    let other = insert(&h.store, GROUP, "unrelated", Label::Ham, sender).await;

    let outcome = h
        .labels
        .relabel(first.id, Label::Spam, Provenance::GroupAdmin)
        .await
        .unwrap();

    assert_eq!(outcome.synced, vec![maybe.id, ham.id]);
    // untrained -> spam and ham -> spam retrain; maybe_spam -> spam does not
    assert_eq!(outcome.enqueued, 2);

    for id in [first.id, maybe.id, ham.id] {
        let example = h.store.get_example(id).await.unwrap().unwrap();
        assert_eq!(example.label, Label::Spam);
    }
    let untouched = h.store.get_example(other.id).await.unwrap().unwrap();
    assert_eq!(untouched.label, Label::Ham);

    let memo = h.store.latest_by_fingerprint(&first.fingerprint).await.unwrap().unwrap();
    assert_eq!(memo.label, Label::Spam);
}

#[tokio::test]
async fn test_unban_relabels_and_retrains() {
    let h = harness(100, false);

    let mut spam = Vec::new();
    for text in ["spam one", "spam two", "spam three"] {
        let example = insert(&h.store, GROUP, text, Label::Spam, spammer()).await;
        h.labels.record_created(&example).await.unwrap();
        spam.push(example);
    }
    insert(&h.store, GROUP, "a real question", Label::Ham, spammer()).await;
    assert_eq!(pending(&h.store, GROUP).await, 3);

    let outcome = h.labels.unban(GROUP, 42).await.unwrap();
    assert!(outcome.ban.is_some());
    assert_eq!(outcome.relabeled, spam.iter().map(|e| e.id).collect::<Vec<_>>());
    assert!(h.store.get_ban(GROUP, 42).await.unwrap().is_none());

    for example in &spam {
        let stored = h.store.get_example(example.id).await.unwrap().unwrap();
        assert_eq!(stored.label, Label::Ham);
        assert_eq!(stored.provenance, Provenance::GroupAdmin);
    }
    assert_eq!(pending(&h.store, GROUP).await, 6);
}

#[tokio::test]
async fn test_unban_without_ban_still_relabels() {
    let h = harness(100, false);
    insert(&h.store, GROUP, "spam one", Label::Spam, spammer()).await;

    let outcome = h.labels.unban(GROUP, 42).await.unwrap();
    assert!(outcome.ban.is_none());
    assert_eq!(outcome.relabeled.len(), 1);
}

#[tokio::test]
async fn test_full_batch_rebuilds_the_scope() {
    let mut h = harness(2, false);

    let spam = insert(&h.store, GROUP, "cheap viagra", Label::Spam, spammer()).await;
    let ham = insert(&h.store, GROUP, "lunch tomorrow", Label::Ham, SenderSnapshot::new(7, "Ann")).await;

    h.labels.record_created(&spam).await.unwrap();
    assert_eq!(h.runner.run_pending().await, 0);

    h.labels.record_created(&ham).await.unwrap();
    assert_eq!(pending(&h.store, GROUP).await, 0);
    assert_eq!(h.runner.run_pending().await, 1);

    let state = h.store.get_state(GROUP).await.unwrap().unwrap();
    assert_eq!(state.total_spam_messages, 1);
    assert_eq!(state.total_ham_messages, 1);

    let verdict = h
        .engine
        .classifier
        .classify(GROUP, None, "cheap viagra")
        .await
        .unwrap();
    assert!(verdict.is_spam);
}

#[tokio::test]
async fn test_inline_training_applies_immediately() {
    let h = harness(100, true);

    let spam = insert(&h.store, GROUP, "cheap viagra", Label::Spam, spammer()).await;
    h.labels.record_created(&spam).await.unwrap();

    let state = h.store.get_state(GROUP).await.unwrap().unwrap();
    assert_eq!(state.total_spam_messages, 1);
    // Still queued for the authoritative rebuild
    assert_eq!(pending(&h.store, GROUP).await, 1);
}
