//! spamwall training
//!
//! Everything that changes a classifier after the fact.
//!
//! This crate provides:
//! - A per-key batch debouncer with size and time triggers
//! - A periodic sweeper driving the time trigger
//! - An in-process job queue and runner
//! - Debounced scope rebuilds fed by label events
//! - Moderation feedback: relabeling, ban escalation, and unban

pub mod batch;
pub mod config;
pub mod jobs;
pub mod moderation;
pub mod sweeper;
pub mod trainer;

pub use batch::{AddOutcome, BatchDebouncer, SweepReport};
pub use config::{BatchSettings, ModerationSettings, TrainingConfig};
pub use jobs::{JobHandler, JobPayload, JobQueue, JobRunner, JobSubmitter, QueuedJob};
pub use moderation::{LabelService, RelabelOutcome, UnbanOutcome};
pub use sweeper::Sweeper;
pub use trainer::{
    training_batch_key, RebuildClassifierJob, TrainingScheduler, REBUILD_CLASSIFIER_JOB,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::batch::BatchDebouncer;
    pub use crate::jobs::{JobHandler, JobPayload, JobQueue, JobRunner, JobSubmitter};
    pub use crate::moderation::LabelService;
    pub use crate::sweeper::Sweeper;
    pub use crate::trainer::{RebuildClassifierJob, TrainingScheduler};
}
