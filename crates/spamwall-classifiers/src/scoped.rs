//! Store-backed Naive Bayes classifier, one state per scope
//!
//! Every writer for a scope (incremental train, batch train, rebuild) runs
//! under that scope's async mutex, so a rebuild never clobbers an in-flight
//! increment. Different scopes proceed in parallel.

use crate::classifier::ClassificationResult;
use crate::config::{ReplayPolicy, ScopeSettings};
use crate::naive_bayes::BayesModel;
use parking_lot::Mutex;
use spamwall_core::{ClassifierState, Result, ScopeId, Target, TrainingExample};
use spamwall_store::{ExampleStore, StateStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Per-scope writer locks. Entries nobody holds or waits on are pruned on
/// the next acquisition, so the map stays as small as the set of busy scopes.
#[derive(Default)]
struct ScopeLocks {
    locks: Mutex<HashMap<ScopeId, Arc<AsyncMutex<()>>>>,
}

impl ScopeLocks {
    async fn lock(&self, scope: ScopeId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(scope).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Naive Bayes classifier bound to the state and example stores
pub struct NaiveBayesClassifier {
    model: BayesModel,
    states: Arc<dyn StateStore>,
    examples: Arc<dyn ExampleStore>,
    scopes: ScopeSettings,
    replay: ReplayPolicy,
    writers: ScopeLocks,
}

impl NaiveBayesClassifier {
    pub fn new(
        model: BayesModel,
        states: Arc<dyn StateStore>,
        examples: Arc<dyn ExampleStore>,
        scopes: ScopeSettings,
        replay: ReplayPolicy,
    ) -> Self {
        Self {
            model,
            states,
            examples,
            scopes,
            replay,
            writers: ScopeLocks::default(),
        }
    }

    pub fn model(&self) -> &BayesModel {
        &self.model
    }

    /// Reserved scope of the global username classifier
    pub fn username_scope(&self) -> ScopeId {
        self.scopes.username_scope
    }

    /// Classifier scope judging `target` for messages from `group`
    pub fn scope_for(&self, group: ScopeId, target: Target) -> ScopeId {
        match target {
            Target::Content => group,
            Target::Username => self.scopes.username_scope,
        }
    }

    /// Classifier scope an example trains
    pub fn scope_of(&self, example: &TrainingExample) -> ScopeId {
        self.scope_for(example.scope, example.target)
    }

    fn target_of(&self, scope: ScopeId) -> Target {
        if scope == self.scopes.username_scope {
            Target::Username
        } else {
            Target::Content
        }
    }

    /// Stored state for `scope`, created on first use.
    ///
    /// A new content scope is seeded with the counters of the most recently
    /// updated other content scope; with no such scope, and always for the
    /// username scope, it starts empty.
    pub async fn load_or_bootstrap(
        &self,
        scope: ScopeId,
        display_name: Option<&str>,
    ) -> Result<ClassifierState> {
        if let Some(state) = self.states.get_state(scope).await? {
            return Ok(state);
        }

        let target = self.target_of(scope);
        let fresh = match target {
            Target::Username => {
                ClassifierState::empty(scope, self.scopes.username_scope_name.clone(), target)
            }
            Target::Content => {
                let name = display_name
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("group {}", scope));
                match self.states.latest_content_state(scope).await? {
                    Some(template) => {
                        info!(
                            "Bootstrapping classifier for scope {} from scope {}",
                            scope, template.scope
                        );
                        ClassifierState::seeded_from(&template, scope, name)
                    }
                    None => {
                        info!("Creating empty classifier for scope {}", scope);
                        ClassifierState::empty(scope, name, target)
                    }
                }
            }
        };

        self.states.insert_state_if_absent(fresh).await
    }

    /// Score `text` against the latest persisted state of `scope`
    pub async fn classify(
        &self,
        scope: ScopeId,
        display_name: Option<&str>,
        text: &str,
    ) -> Result<ClassificationResult> {
        let state = self.load_or_bootstrap(scope, display_name).await?;
        let result = self.model.classify(&state, text);
        metrics::histogram!("spamwall_classify_latency_us").record(result.latency_us as f64);
        Ok(result)
    }

    /// Train one example into its classifier scope; returns whether it was trainable
    pub async fn train(&self, example: &TrainingExample) -> Result<bool> {
        if example.label.training_class().is_none() {
            return Ok(false);
        }
        let trained = self.train_batch(std::slice::from_ref(example)).await?;
        Ok(trained > 0)
    }

    /// Train many examples with one persist per affected scope; returns how many were trainable
    pub async fn train_batch(&self, examples: &[TrainingExample]) -> Result<usize> {
        let mut by_scope: BTreeMap<ScopeId, Vec<&TrainingExample>> = BTreeMap::new();
        for example in examples.iter().filter(|e| e.label.is_trainable()) {
            by_scope.entry(self.scope_of(example)).or_default().push(example);
        }

        let mut trained = 0;
        for (scope, batch) in by_scope {
            let _guard = self.writers.lock(scope).await;
            let display_name = batch.first().and_then(|e| e.scope_name.as_deref());
            let mut state = self.load_or_bootstrap(scope, display_name).await?;
            for example in &batch {
                if self.model.train(&mut state, example) {
                    trained += 1;
                }
            }
            self.states.put_state(state).await?;
            debug!("Trained {} examples into scope {}", batch.len(), scope);
        }

        metrics::counter!("spamwall_examples_trained_total").increment(trained as u64);
        Ok(trained)
    }

    /// Examples a rebuild of `scope` replays
    async fn replay_set(&self, scope: ScopeId) -> Result<Vec<TrainingExample>> {
        match self.target_of(scope) {
            Target::Username => self.examples.trainable_examples(Target::Username, None).await,
            Target::Content => {
                let filter = match self.replay {
                    ReplayPolicy::Shared => None,
                    ReplayPolicy::Scope => Some(scope),
                };
                self.examples.trainable_examples(Target::Content, filter).await
            }
        }
    }

    /// Recompute `scope` from the example log.
    ///
    /// The replacement is built off to the side and persisted in one write, so
    /// a failure leaves the previous state untouched. Idempotent.
    pub async fn rebuild(&self, scope: ScopeId) -> Result<ClassifierState> {
        let _guard = self.writers.lock(scope).await;

        let current = self.load_or_bootstrap(scope, None).await?;
        let examples = self.replay_set(scope).await?;

        let mut rebuilt = current.clone();
        rebuilt.reset();
        for example in &examples {
            self.model.train(&mut rebuilt, example);
        }

        self.states.put_state(rebuilt.clone()).await?;
        info!(
            "Rebuilt classifier for scope {} from {} examples ({} spam / {} ham messages)",
            scope,
            examples.len(),
            rebuilt.total_spam_messages,
            rebuilt.total_ham_messages
        );
        metrics::counter!("spamwall_rebuilds_total").increment(1);
        Ok(rebuilt)
    }

    pub async fn state(&self, scope: ScopeId) -> Result<Option<ClassifierState>> {
        self.states.get_state(scope).await
    }
}
