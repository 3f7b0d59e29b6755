//! spamwall classifiers
//!
//! Text classification for chat spam defense.
//!
//! A message passes through, in order:
//! - Rule pre-filters (cheap heuristics such as CJK spacing evasion)
//! - An exact-text memo of earlier decisions
//! - Per-scope Naive Bayes over the message, then a global one over the sender name
//!
//! Everything runs in memory against the state store; there is no outbound I/O.

pub mod classifier;
pub mod config;
pub mod detection;
pub mod engine;
pub mod naive_bayes;
pub mod rules;
pub mod scoped;
pub mod tokenizer;

pub use classifier::{ClassificationResult, Classifier};
pub use config::{
    BayesSettings, ClassifierConfig, DetectionSettings, ReplayPolicy, RuleSettings,
    ScopeSettings, TokenizerSettings,
};
pub use detection::{Detection, DetectionPipeline, DetectionStage};
pub use engine::{build_engine_from_config, ClassifierEngine};
pub use naive_bayes::{posterior_from_log_odds, BayesModel};
pub use rules::{CjkSpacing, RuleBasedPreFilter};
pub use scoped::NaiveBayesClassifier;
pub use tokenizer::{TextNormalizer, Tokenizer};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassificationResult, Classifier};
    pub use crate::detection::{Detection, DetectionPipeline, DetectionStage};
    pub use crate::rules::RuleBasedPreFilter;
    pub use crate::scoped::NaiveBayesClassifier;
    pub use crate::tokenizer::Tokenizer;
}
