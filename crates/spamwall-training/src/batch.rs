//! Per-key batch debouncer
//!
//! Small events accumulate under a key and are flushed as one job either when
//! the batch fills up (synchronously, inside `add`) or when its time window
//! expires (by a periodic `sweep`). Items are only cleared after the job was
//! accepted, so a failed submission never drops events.

use crate::jobs::{JobPayload, JobSubmitter};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use spamwall_core::{BatchAccumulator, Error, Result};
use spamwall_store::BatchStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// What an `add` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// Items still pending under the key after the call
    pub pending: usize,
    /// The size threshold was reached and the batch flushed
    pub flushed: bool,
}

/// Keys flushed by one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub flushed: Vec<String>,
}

/// Accumulates items per key and flushes them as batched jobs
pub struct BatchDebouncer {
    store: Arc<dyn BatchStore>,
    submitter: Arc<dyn JobSubmitter>,
    keys: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl BatchDebouncer {
    pub fn new(store: Arc<dyn BatchStore>, submitter: Arc<dyn JobSubmitter>) -> Self {
        Self {
            store,
            submitter,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Lock handle for `key`. Handles nobody holds or waits on are pruned first.
    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut keys = self.keys.lock();
        keys.retain(|_, lock| Arc::strong_count(lock) > 1);
        keys.entry(key.to_string()).or_default().clone()
    }

    async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        self.key_lock(key).lock_owned().await
    }

    /// Append `item` under `key`, flushing synchronously once `batch_size` items are pending.
    ///
    /// The first `add` for a key fixes its job, shared arguments, size, and window;
    /// later callers' values are ignored until the accumulator is gone.
    pub async fn add(
        &self,
        key: &str,
        job: &str,
        item: serde_json::Value,
        shared_args: serde_json::Value,
        batch_size: usize,
        window: Duration,
    ) -> Result<AddOutcome> {
        let _guard = self.lock_key(key).await;
        let now = Utc::now();

        let mut batch = match self.store.get_batch(key).await? {
            Some(batch) => batch,
            None => {
                debug!("Creating batch {} for job {}", key, job);
                BatchAccumulator::new(key, job, shared_args, batch_size, window, now)
            }
        };
        batch.push(item);
        self.store.put_batch(batch.clone()).await?;

        if !batch.is_full() {
            return Ok(AddOutcome {
                pending: batch.pending_count,
                flushed: false,
            });
        }

        self.flush(&mut batch, now).await?;
        Ok(AddOutcome {
            pending: batch.pending_count,
            flushed: true,
        })
    }

    /// Submit every pending item as one job, then clear the batch.
    /// Callers hold the key lock.
    async fn flush(&self, batch: &mut BatchAccumulator, now: DateTime<Utc>) -> Result<()> {
        let payload = JobPayload {
            items: batch.items.clone(),
            shared_args: batch.shared_args.clone(),
        };
        let count = payload.items.len();

        self.submitter.submit(&batch.job, payload).await?;
        batch.mark_flushed(now);
        self.store.put_batch(batch.clone()).await?;

        info!("Flushed {} items from batch {} to job {}", count, batch.key, batch.job);
        metrics::counter!("spamwall_batch_flushes_total").increment(1);
        Ok(())
    }

    /// Flush `key` now if it has pending items, regardless of its window
    pub async fn flush_key(&self, key: &str) -> Result<bool> {
        let _guard = self.lock_key(key).await;
        match self.store.get_batch(key).await? {
            Some(mut batch) if batch.pending_count > 0 => {
                self.flush(&mut batch, Utc::now()).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Flush every batch whose window has expired
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Flush every batch whose window had expired at `now`.
    ///
    /// Keys currently locked by an `add` or another sweep are skipped; their
    /// holder flushes them or the next sweep will. A failing flush does not stop
    /// the sweep, but the sweep returns an error naming every failed key.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut failures = Vec::new();

        for key in self.store.pending_batch_keys().await? {
            let Ok(_guard) = self.key_lock(&key).try_lock_owned() else {
                debug!("Batch {} busy, skipping this sweep", key);
                continue;
            };

            let mut batch = match self.store.get_batch(&key).await {
                Ok(Some(batch)) if batch.is_due(now) => batch,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to load batch {}: {}", key, e);
                    failures.push(format!("{}: {}", key, e));
                    continue;
                }
            };

            match self.flush(&mut batch, now).await {
                Ok(()) => report.flushed.push(key),
                Err(e) => {
                    warn!("Failed to flush batch {}: {}", key, e);
                    failures.push(format!("{}: {}", key, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::job(format!(
                "{} batch flushes failed ({} succeeded): {}",
                failures.len(),
                report.flushed.len(),
                failures.join("; ")
            )))
        }
    }
}
