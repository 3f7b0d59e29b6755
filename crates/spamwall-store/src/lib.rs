//! spamwall store
//!
//! Persistence contracts for the spam engine.
//!
//! Provides:
//! - Repository traits for classifier states, training examples, bans, and batch accumulators
//! - A thread-safe in-memory implementation of all of them
//! - JSON snapshot persistence for the in-memory store

pub mod memory;
pub mod repository;
pub mod snapshot;

pub use memory::{MemoryStore, StoreSnapshot};
pub use repository::{BanStore, BatchStore, ExampleStore, FamilyCounts, StateStore};
pub use snapshot::SnapshotConfig;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::memory::MemoryStore;
    pub use crate::repository::{BanStore, BatchStore, ExampleStore, StateStore};
}
