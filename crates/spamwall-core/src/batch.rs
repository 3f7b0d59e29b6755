//! Persisted per-key accumulator of pending batch items

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Pending items for one batch key plus the flush policy fixed at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAccumulator {
    /// Opaque key identifying the batch
    pub key: String,

    /// Job invoked with the pending items on flush
    pub job: String,

    /// Arguments constant across the batch
    #[serde(default)]
    pub shared_args: serde_json::Value,

    /// Item payloads in arrival order
    #[serde(default)]
    pub items: Vec<serde_json::Value>,

    /// Always equal to `items.len()`
    #[serde(default)]
    pub pending_count: usize,

    /// Flush synchronously once this many items are pending
    pub batch_size: usize,

    /// Flush on sweep once this many milliseconds passed since the last flush
    pub window_ms: u64,

    pub last_flushed_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl BatchAccumulator {
    /// Create an empty accumulator
    pub fn new(
        key: impl Into<String>,
        job: impl Into<String>,
        shared_args: serde_json::Value,
        batch_size: usize,
        window: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            job: job.into(),
            shared_args,
            items: Vec::new(),
            pending_count: 0,
            batch_size: batch_size.max(1),
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            last_flushed_at: now,
            created_at: now,
        }
    }

    pub fn push(&mut self, item: serde_json::Value) {
        self.items.push(item);
        self.pending_count = self.items.len();
    }

    /// The window as a chrono duration, saturating at `Duration::MAX`
    pub fn window(&self) -> Duration {
        i64::try_from(self.window_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX)
    }

    /// Size trigger
    pub fn is_full(&self) -> bool {
        self.pending_count >= self.batch_size
    }

    /// Time trigger: something is pending and the window has strictly elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.pending_count > 0 && now - self.last_flushed_at > self.window()
    }

    /// Clear the pending items and stamp the flush time
    pub fn mark_flushed(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.pending_count = 0;
        self.last_flushed_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn accumulator(now: DateTime<Utc>) -> BatchAccumulator {
        BatchAccumulator::new(
            "key",
            "job",
            json!({}),
            3,
            std::time::Duration::from_secs(30),
            now,
        )
    }

    #[test]
    fn test_pending_count_tracks_items() {
        let now = Utc::now();
        let mut batch = accumulator(now);
        batch.push(json!(1));
        batch.push(json!(2));
        assert_eq!(batch.pending_count, 2);
        assert!(!batch.is_full());
        batch.push(json!(3));
        assert!(batch.is_full());

        batch.mark_flushed(now);
        assert_eq!(batch.pending_count, 0);
        assert!(batch.items.is_empty());
    }

    #[test]
    fn test_due_requires_items_and_elapsed_window() {
        let now = Utc::now();
        let mut batch = accumulator(now);
        let later = now + Duration::seconds(31);
        assert!(!batch.is_due(later));

        batch.push(json!("x"));
        assert!(!batch.is_due(now + Duration::seconds(30)));
        assert!(batch.is_due(later));
    }

    #[test]
    fn test_sub_second_window_is_kept() {
        let now = Utc::now();
        let mut batch = BatchAccumulator::new(
            "key",
            "job",
            json!({}),
            3,
            std::time::Duration::from_millis(900),
            now,
        );
        batch.push(json!(1));

        assert_eq!(batch.window_ms, 900);
        assert!(!batch.is_due(now + Duration::milliseconds(5)));
        assert!(!batch.is_due(now + Duration::milliseconds(900)));
        assert!(batch.is_due(now + Duration::milliseconds(901)));
    }

    #[test]
    fn test_huge_window_saturates() {
        let now = Utc::now();
        let mut batch = BatchAccumulator::new(
            "key",
            "job",
            json!({}),
            3,
            std::time::Duration::from_secs(u64::MAX),
            now,
        );
        batch.push(json!(1));

        assert_eq!(batch.window(), Duration::MAX);
        assert!(!batch.is_due(now));
        assert!(!batch.is_due(now + Duration::days(365 * 100)));
    }
}
