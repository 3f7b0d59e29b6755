//! Debounced classifier training
//!
//! Label events are batched per classifier scope. A flush submits one
//! `rebuild_classifier` job for the scope, whose handler recomputes the
//! scope's state from the example log. Rebuilding is idempotent, so a
//! re-delivered job is harmless.

use crate::batch::{AddOutcome, BatchDebouncer};
use crate::config::BatchSettings;
use crate::jobs::{JobHandler, JobPayload};
use async_trait::async_trait;
use serde_json::json;
use spamwall_classifiers::NaiveBayesClassifier;
use spamwall_core::{Error, Result, ScopeId, TrainingExample};
use std::sync::Arc;
use tracing::{debug, info};

/// Job name of a scope rebuild
pub const REBUILD_CLASSIFIER_JOB: &str = "rebuild_classifier";

/// Debounce key of a scope's training events
pub fn training_batch_key(scope: ScopeId) -> String {
    format!("classifier_training:{}", scope)
}

/// Turns label events into debounced rebuilds
pub struct TrainingScheduler {
    debouncer: Arc<BatchDebouncer>,
    classifier: Arc<NaiveBayesClassifier>,
    settings: BatchSettings,
}

impl TrainingScheduler {
    pub fn new(
        debouncer: Arc<BatchDebouncer>,
        classifier: Arc<NaiveBayesClassifier>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            debouncer,
            classifier,
            settings,
        }
    }

    /// Record that `example` changed in a way the classifier must learn
    pub async fn enqueue(&self, example: &TrainingExample) -> Result<AddOutcome> {
        let scope = self.classifier.scope_of(example);
        debug!(
            "Enqueueing example {} ({}) for scope {}",
            example.id, example.label, scope
        );

        self.debouncer
            .add(
                &training_batch_key(scope),
                REBUILD_CLASSIFIER_JOB,
                json!(example.id),
                json!({ "scope": scope }),
                self.settings.batch_size,
                self.settings.window(),
            )
            .await
    }
}

/// Handler of `rebuild_classifier` jobs
pub struct RebuildClassifierJob {
    classifier: Arc<NaiveBayesClassifier>,
}

impl RebuildClassifierJob {
    pub fn new(classifier: Arc<NaiveBayesClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl JobHandler for RebuildClassifierJob {
    fn name(&self) -> &str {
        REBUILD_CLASSIFIER_JOB
    }

    async fn handle(&self, payload: JobPayload) -> Result<()> {
        let scope = payload
            .shared_args
            .get("scope")
            .and_then(serde_json::Value::as_i64)
            .map(ScopeId)
            .ok_or_else(|| Error::job("rebuild_classifier job without a scope"))?;

        info!(
            "Rebuilding scope {} after {} label events",
            scope,
            payload.items.len()
        );
        self.classifier.rebuild(scope).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_key_per_scope() {
        assert_eq!(training_batch_key(ScopeId(-1001)), "classifier_training:-1001");
        assert_eq!(training_batch_key(ScopeId(0)), "classifier_training:0");
    }
}
