//! Periodic driver for time-based batch flushes

use crate::batch::BatchDebouncer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Calls [`BatchDebouncer::sweep`] on a fixed cadence until cancelled
pub struct Sweeper {
    debouncer: Arc<BatchDebouncer>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(debouncer: Arc<BatchDebouncer>, interval: Duration) -> Self {
        Self {
            debouncer,
            interval,
        }
    }

    /// Run on a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow sweep delays the next one instead of causing a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Batch sweeper started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.debouncer.sweep().await {
                    Ok(report) if !report.flushed.is_empty() => {
                        debug!("Sweep flushed {} batches", report.flushed.len());
                    }
                    Ok(_) => {}
                    Err(e) => error!("Batch sweep failed: {}", e),
                },
            }
        }

        info!("Batch sweeper stopped");
    }
}
