//! spamwall core
//!
//! Data model and error handling shared by every spamwall crate.
//!
//! This crate provides:
//! - Scope, target, and example types for the training log
//! - The label state machine deciding when a label change retrains
//! - Persisted classifier counters and batch accumulators
//! - The common error type

pub mod batch;
pub mod error;
pub mod label;
pub mod state;
pub mod types;

pub use batch::BatchAccumulator;
pub use error::{Error, Result};
pub use label::{Label, LabelFamily, Provenance, TrainingClass};
pub use state::ClassifierState;
pub use types::{
    fingerprint, BanRecord, DetectionResult, ExampleId, InboundMessage, NewExample, ScopeId,
    SenderSnapshot, Target, TrainingExample,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::label::{Label, Provenance, TrainingClass};
    pub use crate::state::ClassifierState;
    pub use crate::types::{
        DetectionResult, ExampleId, InboundMessage, NewExample, ScopeId, SenderSnapshot, Target,
        TrainingExample,
    };
}
