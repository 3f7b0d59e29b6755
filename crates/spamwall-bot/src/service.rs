//! Engine wiring and event handling
//!
//! One [`SpamService`] owns the store, the classifier engine, and the training
//! side. The chat transport hands it events and acts on the outcomes (deleting
//! flagged messages, enforcing bans).

use crate::config::BotConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use spamwall_classifiers::{build_engine_from_config, ClassifierEngine};
use spamwall_core::{
    BanRecord, DetectionResult, ExampleId, InboundMessage, Label, NewExample, Provenance,
    ScopeId, Target,
};
use spamwall_store::{ExampleStore, MemoryStore};
use spamwall_training::{
    BatchDebouncer, JobQueue, JobRunner, LabelService, RebuildClassifierJob, Sweeper,
    TrainingScheduler,
};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// An event from the chat transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    /// A new chat message to judge
    Message(InboundMessage),

    /// A moderator corrected a label
    Relabel {
        example_id: ExampleId,
        label: Label,
        #[serde(default = "default_relabel_provenance")]
        provenance: Provenance,
    },

    /// A moderator lifted a ban
    Unban { scope: ScopeId, sender_id: i64 },
}

fn default_relabel_provenance() -> Provenance {
    Provenance::GroupAdmin
}

/// What the transport should know about a handled event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotOutcome {
    Detection {
        scope: ScopeId,
        message_id: i64,
        #[serde(flatten)]
        result: DetectionResult,
        stage: String,
        recorded: Vec<ExampleId>,
        /// Sender to ban, when this message crossed the threshold
        #[serde(skip_serializing_if = "Option::is_none")]
        ban: Option<BanRecord>,
    },
    Relabeled {
        example_id: ExampleId,
        previous: Label,
        label: Label,
        synced: Vec<ExampleId>,
    },
    Unbanned {
        scope: ScopeId,
        sender_id: i64,
        was_banned: bool,
        relabeled: Vec<ExampleId>,
    },
    Error {
        message: String,
    },
}

/// A labelled example in a bootstrap import file (one JSON object per line)
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    pub scope: ScopeId,
    #[serde(default)]
    pub scope_name: Option<String>,
    pub text: String,
    #[serde(default = "default_import_target")]
    pub target: Target,
    pub label: Label,
}

fn default_import_target() -> Target {
    Target::Content
}

/// Background tasks started by [`SpamService::start_background`]
pub struct BackgroundTasks {
    cancel: CancellationToken,
    runner: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Stop the sweeper and drain the job queue
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.sweeper.await {
            warn!("Sweeper task ended abnormally: {}", e);
        }
        if let Err(e) = self.runner.await {
            warn!("Job runner task ended abnormally: {}", e);
        }
    }
}

/// The spam engine and everything it needs
pub struct SpamService {
    config: BotConfig,
    store: Arc<MemoryStore>,
    engine: ClassifierEngine,
    debouncer: Arc<BatchDebouncer>,
    labels: LabelService,
    runner: Option<JobRunner>,
}

impl SpamService {
    /// Build the service over `store`
    pub fn new(config: BotConfig, store: Arc<MemoryStore>) -> Result<Self> {
        let engine = build_engine_from_config(&config.classifier, store.clone(), store.clone())?;

        let (queue, receiver) = JobQueue::new();
        let debouncer = Arc::new(BatchDebouncer::new(store.clone(), Arc::new(queue)));
        let scheduler = Arc::new(TrainingScheduler::new(
            debouncer.clone(),
            engine.classifier.clone(),
            config.training.batching.clone(),
        ));
        let labels = LabelService::new(
            store.clone(),
            store.clone(),
            scheduler,
            engine.classifier.clone(),
            config.training.moderation.clone(),
        );
        let runner = JobRunner::new(receiver)
            .register(Arc::new(RebuildClassifierJob::new(engine.classifier.clone())));

        Ok(Self {
            config,
            store,
            engine,
            debouncer,
            labels,
            runner: Some(runner),
        })
    }

    /// Load the snapshot named in `config` and build the service over it
    pub fn open(config: BotConfig) -> Result<Self> {
        let store = spamwall_store::snapshot::load(&config.snapshot.path)?;
        Self::new(config, Arc::new(store))
    }

    pub fn engine(&self) -> &ClassifierEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Start the job runner and the batch sweeper. Only the first call starts anything.
    pub fn start_background(&mut self) -> Option<BackgroundTasks> {
        let runner = self.runner.take()?;
        let cancel = CancellationToken::new();

        let runner = tokio::spawn(runner.run(cancel.clone()));
        let sweeper = Sweeper::new(
            self.debouncer.clone(),
            self.config.training.batching.sweep_interval(),
        )
        .spawn(cancel.clone());

        Some(BackgroundTasks {
            cancel,
            runner,
            sweeper,
        })
    }

    /// Run queued jobs inline; for one-shot commands without background tasks
    pub async fn run_pending_jobs(&mut self) -> usize {
        match self.runner.as_mut() {
            Some(runner) => runner.run_pending().await,
            None => 0,
        }
    }

    /// Handle one event; failures become an `Error` outcome
    pub async fn handle(&self, event: BotEvent) -> BotOutcome {
        let result = match event {
            BotEvent::Message(message) => self.handle_message(&message).await,
            BotEvent::Relabel {
                example_id,
                label,
                provenance,
            } => self.handle_relabel(example_id, label, provenance).await,
            BotEvent::Unban { scope, sender_id } => self.handle_unban(scope, sender_id).await,
        };

        result.unwrap_or_else(|e| {
            warn!("Event handling failed: {:#}", e);
            BotOutcome::Error {
                message: e.to_string(),
            }
        })
    }

    async fn handle_message(&self, message: &InboundMessage) -> Result<BotOutcome> {
        let detection = self.engine.pipeline.process(message).await?;

        let mut ban = None;
        for example in &detection.recorded {
            if let Some(new_ban) = self.labels.record_created(example).await? {
                ban = Some(new_ban);
            }
        }

        if detection.result.is_spam {
            info!(
                "Spam in scope {} (message {}, {}, p_spam {:.3})",
                message.scope,
                message.message_id,
                detection.stage.as_str(),
                detection.result.p_spam
            );
        }

        Ok(BotOutcome::Detection {
            scope: message.scope,
            message_id: message.message_id,
            result: detection.result,
            stage: detection.stage.as_str().to_string(),
            recorded: detection.recorded.iter().map(|e| e.id).collect(),
            ban,
        })
    }

    async fn handle_relabel(
        &self,
        example_id: ExampleId,
        label: Label,
        provenance: Provenance,
    ) -> Result<BotOutcome> {
        let outcome = self.labels.relabel(example_id, label, provenance).await?;
        Ok(BotOutcome::Relabeled {
            example_id,
            previous: outcome.previous,
            label,
            synced: outcome.synced,
        })
    }

    async fn handle_unban(&self, scope: ScopeId, sender_id: i64) -> Result<BotOutcome> {
        let outcome = self.labels.unban(scope, sender_id).await?;
        Ok(BotOutcome::Unbanned {
            scope,
            sender_id,
            was_banned: outcome.ban.is_some(),
            relabeled: outcome.relabeled,
        })
    }

    /// Store labelled examples from a JSON-lines reader and train them in one batch
    pub async fn import<R: BufRead>(&self, reader: R) -> Result<usize> {
        let mut examples = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ImportRecord = serde_json::from_str(&line)
                .map_err(|e| anyhow::anyhow!("line {}: {}", index + 1, e))?;

            let example = self
                .store
                .insert_example(
                    NewExample::new(record.scope, record.target, record.text, record.label)
                        .with_scope_name(record.scope_name)
                        .with_provenance(Provenance::BootstrapImport),
                )
                .await?;
            examples.push(example);
        }

        let trained = self.engine.classifier.train_batch(&examples).await?;
        info!("Imported {} examples ({} trainable)", examples.len(), trained);
        Ok(examples.len())
    }

    /// Write the store to the configured snapshot path
    pub fn save_snapshot(&self) -> Result<()> {
        self.save_snapshot_to(&self.config.snapshot.path)
    }

    pub fn save_snapshot_to(&self, path: &Path) -> Result<()> {
        spamwall_store::snapshot::save(&self.store, path)?;
        Ok(())
    }
}
