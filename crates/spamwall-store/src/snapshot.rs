//! Snapshot persistence for the in-memory store
//!
//! Provides file-based persistence with:
//! - Pretty-printed JSON, one document per snapshot
//! - Atomic replacement (write to a sibling temp file, then rename)
//! - Tolerant loading (a missing file yields an empty store)

use crate::memory::{MemoryStore, StoreSnapshot};
use serde::{Deserialize, Serialize};
use spamwall_core::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for snapshot persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// File holding the snapshot
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,

    /// Save every this many seconds while running (0 disables periodic saves)
    #[serde(default = "default_save_interval")]
    pub save_interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
            save_interval_secs: default_save_interval(),
        }
    }
}

impl SnapshotConfig {
    /// Periodic save cadence, `None` when periodic saves are off
    pub fn save_interval(&self) -> Option<Duration> {
        match self.save_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/spamwall.json")
}

fn default_save_interval() -> u64 {
    60
}

/// Load a store from `path`, or an empty one if the file does not exist
pub fn load(path: impl AsRef<Path>) -> Result<MemoryStore> {
    let path = path.as_ref();
    if !path.exists() {
        info!("No snapshot at {:?}, starting with an empty store", path);
        return Ok(MemoryStore::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let snapshot: StoreSnapshot = serde_json::from_reader(reader)?;
    info!(
        "Loaded snapshot from {:?}: {} states, {} examples, {} bans",
        path,
        snapshot.states.len(),
        snapshot.examples.len(),
        snapshot.bans.len()
    );
    Ok(MemoryStore::from_snapshot(snapshot))
}

/// Write the store to `path`, replacing any previous snapshot atomically
pub fn save(store: &MemoryStore, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let snapshot = store.snapshot();
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;

    debug!(
        "Saved snapshot to {:?} ({} examples)",
        path,
        snapshot.examples.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ExampleStore, StateStore};
    use spamwall_core::{ClassifierState, Label, NewExample, ScopeId, Target, TrainingClass};
    use tempfile::TempDir;

    #[test]
    fn test_zero_interval_disables_periodic_saves() {
        let config = SnapshotConfig {
            save_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.save_interval(), None);
        assert_eq!(
            SnapshotConfig::default().save_interval(),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn test_save_then_load_restores_index_and_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = MemoryStore::new();
        let spam = store
            .insert_example(NewExample::new(ScopeId(-5), Target::Content, "airdrop", Label::Spam))
            .await
            .unwrap();
        let mut state = ClassifierState::empty(ScopeId(-5), "group", Target::Content);
        state.absorb(TrainingClass::Spam, &["airdrop".to_string()]);
        store.put_state(state).await.unwrap();

        save(&store, &path).unwrap();
        let restored = load(&path).unwrap();

        let memo = restored.latest_by_fingerprint(&spam.fingerprint).await.unwrap();
        assert_eq!(memo.map(|e| e.id), Some(spam.id));

        let next = restored
            .insert_example(NewExample::new(ScopeId(-5), Target::Content, "other", Label::Ham))
            .await
            .unwrap();
        assert!(next.id > spam.id);

        let state = restored.get_state(ScopeId(-5)).await.unwrap().unwrap();
        assert_eq!(state.vocabulary_size, 1);
    }

    #[test]
    fn test_missing_snapshot_loads_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = load(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.example_count(), 0);
    }
}
