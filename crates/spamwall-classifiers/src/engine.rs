//! Assemble the classifier stack from configuration

use crate::config::ClassifierConfig;
use crate::detection::DetectionPipeline;
use crate::naive_bayes::BayesModel;
use crate::rules::RuleBasedPreFilter;
use crate::scoped::NaiveBayesClassifier;
use crate::tokenizer::Tokenizer;
use spamwall_core::Result;
use spamwall_store::{ExampleStore, StateStore};
use std::sync::Arc;
use tracing::info;

/// Shared tokenizer, classifier, and detection pipeline
pub struct ClassifierEngine {
    pub tokenizer: Arc<Tokenizer>,
    pub classifier: Arc<NaiveBayesClassifier>,
    pub pipeline: Arc<DetectionPipeline>,
}

/// Build the engine for `config` over the given stores
pub fn build_engine_from_config(
    config: &ClassifierConfig,
    states: Arc<dyn StateStore>,
    examples: Arc<dyn ExampleStore>,
) -> Result<ClassifierEngine> {
    config.validate()?;

    let tokenizer = Arc::new(Tokenizer::from_optional_dict(
        config.tokenizer.user_dict.as_deref(),
    )?);
    let model = BayesModel::from_settings(tokenizer.clone(), &config.bayes);
    let classifier = Arc::new(NaiveBayesClassifier::new(
        model,
        states,
        examples.clone(),
        config.scopes.clone(),
        config.bayes.replay,
    ));

    let mut pipeline = DetectionPipeline::new(classifier.clone(), examples, &config.detection)?;
    if config.rules.enabled {
        pipeline = pipeline.with_prefilter(Arc::new(RuleBasedPreFilter::from_settings(&config.rules)?));
    }

    info!(
        "Classifier engine ready (threshold {}, top_k {:?}, rules {})",
        config.bayes.spam_threshold,
        config.bayes.top_k,
        if config.rules.enabled { "on" } else { "off" }
    );

    Ok(ClassifierEngine {
        tokenizer,
        classifier,
        pipeline: Arc::new(pipeline),
    })
}
