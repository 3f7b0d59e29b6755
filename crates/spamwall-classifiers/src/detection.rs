//! Per-message spam detection
//!
//! Stages run in strict order and the first decisive one wins:
//! 1. Blank text: non-spam, no side effects
//! 2. Rule pre-filters
//! 3. Exact-text memo of earlier decisions, per target
//! 4. Naive Bayes, message content first, then the sender's display name
//!
//! The pipeline records what it learned as training examples and reports them
//! to the caller. It never deletes messages or bans senders.

use crate::classifier::Classifier;
use crate::config::DetectionSettings;
use crate::scoped::NaiveBayesClassifier;
use regex::Regex;
use spamwall_core::{
    fingerprint, DetectionResult, Error, InboundMessage, Label, NewExample, Provenance, Result,
    Target, TrainingExample,
};
use spamwall_store::ExampleStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Stage that settled a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStage {
    /// Nothing to judge
    Empty,
    Rule,
    Memo,
    Bayes,
    /// Every stage passed
    Clean,
}

impl DetectionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Rule => "rule",
            Self::Memo => "memo",
            Self::Bayes => "bayes",
            Self::Clean => "clean",
        }
    }
}

/// Outcome of processing one message
#[derive(Debug, Clone)]
pub struct Detection {
    pub result: DetectionResult,
    pub stage: DetectionStage,
    /// Examples recorded while processing, in creation order
    pub recorded: Vec<TrainingExample>,
}

impl Detection {
    fn new(result: DetectionResult, stage: DetectionStage) -> Self {
        Self {
            result,
            stage,
            recorded: Vec::new(),
        }
    }
}

/// Detection pipeline over the rule pre-filters, memo, and Bayes classifiers
pub struct DetectionPipeline {
    prefilters: Vec<Arc<dyn Classifier>>,
    classifier: Arc<NaiveBayesClassifier>,
    examples: Arc<dyn ExampleStore>,
    forwarded_report: Regex,
    ham_balance_p_spam: f64,
}

impl DetectionPipeline {
    pub fn new(
        classifier: Arc<NaiveBayesClassifier>,
        examples: Arc<dyn ExampleStore>,
        settings: &DetectionSettings,
    ) -> Result<Self> {
        let forwarded_report = Regex::new(
            r#"(?s)^#FOUND\s+"[^"]+"\s+IN\s+[^(]+\(@?[^)]+\)\s+FROM\s+[^(]*\(@?[^)]+\)\s*(.*)"#,
        )
        .map_err(|e| Error::classifier(format!("Failed to compile report regex: {}", e)))?;

        Ok(Self {
            prefilters: Vec::new(),
            classifier,
            examples,
            forwarded_report,
            ham_balance_p_spam: settings.ham_balance_p_spam,
        })
    }

    /// Add a pre-filter; pre-filters run in the order added
    pub fn with_prefilter(mut self, prefilter: Arc<dyn Classifier>) -> Self {
        self.prefilters.push(prefilter);
        self
    }

    /// Body of a monitor-bot `#FOUND "kw" IN chat(@handle) FROM name(id) body`
    /// report, or the text unchanged
    pub fn extract_forwarded_body<'a>(&self, text: &'a str) -> &'a str {
        self.forwarded_report
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map_or(text, |body| body.as_str())
    }

    /// Message text with its contextual signals appended as pseudo-tokens
    pub fn searchable_text(&self, message: &InboundMessage) -> String {
        let body = self.extract_forwarded_body(&message.text);
        if message.signals.is_empty() {
            body.to_string()
        } else {
            format!("{} {}", body, message.signals.join(" "))
        }
    }

    /// Judge one message
    pub async fn process(&self, message: &InboundMessage) -> Result<Detection> {
        let text = self.searchable_text(message);
        if text.trim().is_empty() {
            return Ok(self.finish(Detection::new(DetectionResult::non_spam(), DetectionStage::Empty)));
        }

        for prefilter in &self.prefilters {
            let verdict = prefilter.classify(&text).await?;
            if verdict.is_spam {
                info!(
                    "Pre-filter {} flagged message {} in scope {}",
                    prefilter.name(),
                    message.message_id,
                    message.scope
                );
                let mut detection = Detection::new(
                    DetectionResult::spam(Target::Content, verdict.p_spam),
                    DetectionStage::Rule,
                );
                detection
                    .recorded
                    .push(self.record(message, Target::Content, &text, Label::Spam).await?);
                return Ok(self.finish(detection));
            }
        }

        let display_name = message.sender.display_name();
        let targets = [(Target::Content, text.as_str()), (Target::Username, display_name.as_str())];

        let mut recorded = Vec::new();
        for (target, value) in targets {
            if value.trim().is_empty() {
                continue;
            }

            if let Some(precedent) = self.examples.latest_by_fingerprint(&fingerprint(value)).await? {
                match precedent.label {
                    Label::Spam => {
                        info!(
                            "{} matches spam example {} ({})",
                            target, precedent.id, precedent.target
                        );
                        let mut detection = Detection::new(
                            DetectionResult::spam(target, 1.0),
                            DetectionStage::Memo,
                        );
                        detection.recorded = recorded;
                        detection
                            .recorded
                            .push(self.record(message, target, value, Label::Spam).await?);
                        return Ok(self.finish(detection));
                    }
                    Label::Ham => {
                        debug!("{} matches ham example {}", target, precedent.id);
                        continue;
                    }
                    Label::Untrained | Label::MaybeSpam | Label::MaybeHam => {}
                }
            }

            let scope = self.classifier.scope_for(message.scope, target);
            let verdict = self
                .classifier
                .classify(scope, message.scope_name.as_deref(), value)
                .await?;
            debug!(
                "Classified {} in scope {}: is_spam={}, p_spam={:.4}",
                target, scope, verdict.is_spam, verdict.p_spam
            );

            if verdict.is_spam {
                let mut detection = Detection::new(
                    DetectionResult::spam(target, verdict.p_spam),
                    DetectionStage::Bayes,
                );
                detection.recorded = recorded;
                detection
                    .recorded
                    .push(self.record(message, target, value, Label::MaybeSpam).await?);
                return Ok(self.finish(detection));
            }

            if verdict.p_spam < self.ham_balance_p_spam {
                let counts = self.examples.family_counts(target).await?;
                if counts.spam > counts.ham {
                    recorded.push(self.record(message, target, value, Label::MaybeHam).await?);
                }
            }
        }

        let mut detection = Detection::new(DetectionResult::non_spam(), DetectionStage::Clean);
        detection.recorded = recorded;
        Ok(self.finish(detection))
    }

    async fn record(
        &self,
        message: &InboundMessage,
        target: Target,
        value: &str,
        label: Label,
    ) -> Result<TrainingExample> {
        let provenance = if label.is_trainable() {
            Provenance::AutoSync
        } else {
            Provenance::NotMarkedYet
        };

        self.examples
            .insert_example(
                NewExample::new(message.scope, target, value, label)
                    .with_scope_name(message.scope_name.clone())
                    .with_provenance(provenance)
                    .with_message_id(message.message_id)
                    .with_sender(message.sender.clone()),
            )
            .await
    }

    fn finish(&self, detection: Detection) -> Detection {
        metrics::counter!("spamwall_detections_total", "stage" => detection.stage.as_str())
            .increment(1);
        detection
    }
}
