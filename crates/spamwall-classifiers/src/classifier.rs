//! Classifier trait and common types

use async_trait::async_trait;
use spamwall_core::Result;

/// Trait for stateless text classifiers, such as the rule pre-filter
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the given text
    async fn classify(&self, text: &str) -> Result<ClassificationResult>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Result of classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub is_spam: bool,

    /// Posterior spam probability (0.0-1.0)
    pub p_spam: f64,

    /// Latency in microseconds
    pub latency_us: u64,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(is_spam: bool, p_spam: f64) -> Self {
        Self {
            is_spam,
            p_spam,
            latency_us: 0,
        }
    }

    /// No opinion: not spam, zero probability
    pub fn neutral() -> Self {
        Self::new(false, 0.0)
    }

    pub fn with_latency(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }
}
