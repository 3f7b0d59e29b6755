//! Label feedback: recording, relabeling, ban escalation, and unban
//!
//! Every label change that crosses the trainable boundary, or flips a decisive
//! label between spam and ham, is handed to the [`TrainingScheduler`].

use crate::config::ModerationSettings;
use crate::trainer::TrainingScheduler;
use chrono::Utc;
use spamwall_classifiers::NaiveBayesClassifier;
use spamwall_core::{
    BanRecord, ExampleId, Label, Provenance, Result, ScopeId, TrainingExample,
};
use spamwall_store::{BanStore, ExampleStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a moderator relabel
#[derive(Debug, Clone)]
pub struct RelabelOutcome {
    pub example: TrainingExample,
    pub previous: Label,
    /// Other examples with the same text that were relabeled along with it
    pub synced: Vec<ExampleId>,
    /// Label changes handed to training
    pub enqueued: usize,
}

/// Result of an unban
#[derive(Debug, Clone)]
pub struct UnbanOutcome {
    /// The removed ban, if one was active
    pub ban: Option<BanRecord>,
    /// Examples flipped from spam to ham
    pub relabeled: Vec<ExampleId>,
}

/// Applies label feedback and decides bans
pub struct LabelService {
    examples: Arc<dyn ExampleStore>,
    bans: Arc<dyn BanStore>,
    scheduler: Arc<TrainingScheduler>,
    classifier: Arc<NaiveBayesClassifier>,
    settings: ModerationSettings,
}

impl LabelService {
    pub fn new(
        examples: Arc<dyn ExampleStore>,
        bans: Arc<dyn BanStore>,
        scheduler: Arc<TrainingScheduler>,
        classifier: Arc<NaiveBayesClassifier>,
        settings: ModerationSettings,
    ) -> Self {
        Self {
            examples,
            bans,
            scheduler,
            classifier,
            settings,
        }
    }

    /// Handle an example the detection pipeline just recorded.
    ///
    /// Decisive examples are queued for training; a confident spam example may
    /// ban its sender, in which case the new ban is returned for the transport
    /// to enforce.
    pub async fn record_created(&self, example: &TrainingExample) -> Result<Option<BanRecord>> {
        if !example.label.is_trainable() {
            return Ok(None);
        }

        if self.settings.inline_training && example.label == Label::Spam {
            self.classifier.train(example).await?;
        }
        self.scheduler.enqueue(example).await?;

        if example.label == Label::Spam {
            self.escalate(example).await
        } else {
            Ok(None)
        }
    }

    /// Ban the sender of `example` once their confident spam count in its scope
    /// reaches the threshold
    async fn escalate(&self, example: &TrainingExample) -> Result<Option<BanRecord>> {
        let sender = &example.sender;
        let spam = self
            .examples
            .sender_examples(example.scope, sender.id, Label::Spam)
            .await?;
        if spam.len() < self.settings.ban_threshold {
            debug!(
                "Sender {} has {}/{} spam examples in scope {}",
                sender.id,
                spam.len(),
                self.settings.ban_threshold,
                example.scope
            );
            return Ok(None);
        }

        if self.bans.get_ban(example.scope, sender.id).await?.is_some() {
            return Ok(None);
        }

        let ban = BanRecord {
            scope: example.scope,
            scope_name: example.scope_name.clone(),
            sender: sender.clone(),
            spam_text: example.text.clone(),
            message_id: example.message_id,
            banned_at: Utc::now(),
        };
        if !self.bans.insert_ban(ban.clone()).await? {
            return Ok(None);
        }

        info!(
            "Banning sender {} ({}) in scope {} after {} spam messages",
            sender.id,
            sender.display_name(),
            example.scope,
            spam.len()
        );
        metrics::counter!("spamwall_bans_total").increment(1);
        Ok(Some(ban))
    }

    /// Set the label of one example and of every other example with the same text
    pub async fn relabel(
        &self,
        id: ExampleId,
        label: Label,
        provenance: Provenance,
    ) -> Result<RelabelOutcome> {
        let (previous, example) = self.examples.update_label(id, label, provenance).await?;
        let mut enqueued = 0;
        if Label::requires_retrain(previous, label) {
            self.scheduler.enqueue(&example).await?;
            enqueued += 1;
        }

        let mut synced = Vec::new();
        for other in self.examples.find_by_fingerprint(&example.fingerprint).await? {
            if other.id == id || other.label == label {
                continue;
            }
            let (before, updated) = self.examples.update_label(other.id, label, provenance).await?;
            if Label::requires_retrain(before, label) {
                self.scheduler.enqueue(&updated).await?;
                enqueued += 1;
            }
            synced.push(other.id);
        }

        info!(
            "Example {} relabeled {} -> {} by {:?} ({} duplicates synced)",
            id,
            previous,
            label,
            provenance,
            synced.len()
        );
        Ok(RelabelOutcome {
            example,
            previous,
            synced,
            enqueued,
        })
    }

    /// Lift the ban on `sender_id` in `scope` and treat their spam there as ham
    pub async fn unban(&self, scope: ScopeId, sender_id: i64) -> Result<UnbanOutcome> {
        let ban = self.bans.remove_ban(scope, sender_id).await?;

        let mut relabeled = Vec::new();
        for example in self
            .examples
            .sender_examples(scope, sender_id, Label::Spam)
            .await?
        {
            let (_, updated) = self
                .examples
                .update_label(example.id, Label::Ham, Provenance::GroupAdmin)
                .await?;
            self.scheduler.enqueue(&updated).await?;
            relabeled.push(updated.id);
        }

        info!(
            "Unbanned sender {} in scope {} ({} examples relabeled to ham)",
            sender_id,
            scope,
            relabeled.len()
        );
        Ok(UnbanOutcome { ban, relabeled })
    }

    pub async fn bans(&self, scope: ScopeId) -> Result<Vec<BanRecord>> {
        self.bans.list_bans(scope).await
    }
}
