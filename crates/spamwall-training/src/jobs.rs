//! In-process background jobs
//!
//! Provides:
//! - The [`JobSubmitter`] seam the batch debouncer flushes into
//! - An unbounded queue implementing it
//! - A runner dispatching queued jobs to named handlers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spamwall_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Arguments of one job invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Per-event items, in arrival order
    pub items: Vec<serde_json::Value>,

    /// Arguments common to the whole batch
    pub shared_args: serde_json::Value,
}

/// Accepts jobs for asynchronous execution
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Enqueue one invocation of `job`. Success means the job is durably queued.
    async fn submit(&self, job: &str, payload: JobPayload) -> Result<()>;
}

/// Executes one kind of job
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Job name this handler serves
    fn name(&self) -> &str;

    async fn handle(&self, payload: JobPayload) -> Result<()>;
}

/// A job waiting to run
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: String,
    pub payload: JobPayload,
}

/// Unbounded in-process job queue
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
}

impl JobQueue {
    /// Create a queue and the receiver its runner consumes
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueuedJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobSubmitter for JobQueue {
    async fn submit(&self, job: &str, payload: JobPayload) -> Result<()> {
        debug!("Queueing job {} with {} items", job, payload.items.len());
        self.sender
            .send(QueuedJob {
                job: job.to_string(),
                payload,
            })
            .map_err(|_| Error::job(format!("Job queue closed, cannot submit {}", job)))
    }
}

/// Dispatches queued jobs to their handlers, one at a time
pub struct JobRunner {
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    max_attempts: u32,
}

impl JobRunner {
    pub fn new(receiver: mpsc::UnboundedReceiver<QueuedJob>) -> Self {
        Self {
            receiver,
            handlers: HashMap::new(),
            max_attempts: 3,
        }
    }

    /// Register a handler under its name, replacing any previous one
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.name().to_string(), handler);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Run one job, retrying failures; returns whether it eventually succeeded
    pub async fn execute(&self, queued: QueuedJob) -> bool {
        let Some(handler) = self.handlers.get(&queued.job) else {
            error!("No handler registered for job {}", queued.job);
            metrics::counter!("spamwall_jobs_total", "job" => queued.job.clone(), "outcome" => "unknown")
                .increment(1);
            return false;
        };

        for attempt in 1..=self.max_attempts {
            match handler.handle(queued.payload.clone()).await {
                Ok(()) => {
                    metrics::counter!("spamwall_jobs_total", "job" => queued.job.clone(), "outcome" => "ok")
                        .increment(1);
                    return true;
                }
                Err(e) => warn!(
                    "Job {} failed (attempt {}/{}): {}",
                    queued.job, attempt, self.max_attempts, e
                ),
            }
        }

        error!("Job {} abandoned after {} attempts", queued.job, self.max_attempts);
        metrics::counter!("spamwall_jobs_total", "job" => queued.job.clone(), "outcome" => "failed")
            .increment(1);
        false
    }

    /// Run every job already queued, without waiting for more; returns how many ran
    pub async fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(queued) = self.receiver.try_recv() {
            self.execute(queued).await;
            ran += 1;
        }
        ran
    }

    /// Process jobs until cancelled or every submitter is gone
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Job runner started with handlers: {:?}", self.handlers.keys().collect::<Vec<_>>());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let drained = self.run_pending().await;
                    info!("Job runner stopping ({} queued jobs drained)", drained);
                    break;
                }
                next = self.receiver.recv() => match next {
                    Some(queued) => {
                        self.execute(queued).await;
                    }
                    None => {
                        info!("Job queue closed, runner stopping");
                        break;
                    }
                },
            }
        }
    }
}
