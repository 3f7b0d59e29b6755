//! Multinomial Naive Bayes over a [`ClassifierState`]
//!
//! Scoring works in log-space with Laplace (+1) smoothing. Optionally only the
//! top-K most decisive tokens contribute, so long messages are not drowned out
//! by filler words.

use crate::classifier::ClassificationResult;
use crate::config::BayesSettings;
use crate::tokenizer::Tokenizer;
use spamwall_core::{ClassifierState, TrainingClass, TrainingExample};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Log-odds beyond which the posterior is pinned to exactly 0 or 1
const LOG_ODDS_CLAMP: f64 = 700.0;

/// Convert a spam-minus-ham log-odds difference into P(spam)
pub fn posterior_from_log_odds(diff: f64) -> f64 {
    if diff > LOG_ODDS_CLAMP {
        1.0
    } else if diff < -LOG_ODDS_CLAMP {
        0.0
    } else {
        1.0 / (1.0 + (-diff).exp())
    }
}

/// Training and scoring math, independent of storage
pub struct BayesModel {
    tokenizer: Arc<Tokenizer>,
    spam_threshold: f64,
    top_k: Option<usize>,
}

struct TokenEvidence<'a> {
    token: &'a str,
    spam_likelihood: f64,
    ham_likelihood: f64,
    interest: f64,
}

impl BayesModel {
    pub fn new(tokenizer: Arc<Tokenizer>, spam_threshold: f64, top_k: Option<usize>) -> Self {
        Self {
            tokenizer,
            spam_threshold,
            top_k,
        }
    }

    pub fn from_settings(tokenizer: Arc<Tokenizer>, settings: &BayesSettings) -> Self {
        Self::new(tokenizer, settings.spam_threshold, settings.top_k)
    }

    pub fn spam_threshold(&self) -> f64 {
        self.spam_threshold
    }

    /// Add one message of `class` to `state`
    pub fn train_text(&self, state: &mut ClassifierState, class: TrainingClass, text: &str) {
        let tokens = self.tokenizer.tokenize(text);
        state.absorb(class, &tokens);
    }

    /// Add `example` to `state` when its label is decisive; returns whether it was applied
    pub fn train(&self, state: &mut ClassifierState, example: &TrainingExample) -> bool {
        match example.label.training_class() {
            Some(class) => {
                self.train_text(state, class, &example.text);
                true
            }
            None => false,
        }
    }

    /// Score `text` against `state`
    pub fn classify(&self, state: &ClassifierState, text: &str) -> ClassificationResult {
        let start = Instant::now();

        if state.is_cold() {
            return ClassificationResult::neutral()
                .with_latency(start.elapsed().as_micros() as u64);
        }

        let spam_messages = state.total_spam_messages as f64;
        let ham_messages = state.total_ham_messages as f64;
        let spam_prior = spam_messages / (spam_messages + ham_messages);
        let ham_prior = 1.0 - spam_prior;

        let vocabulary = state.vocabulary_size as f64;
        let spam_denominator = (state.total_spam_words as f64 + vocabulary).max(1.0);
        let ham_denominator = (state.total_ham_words as f64 + vocabulary).max(1.0);

        let tokens = self.tokenizer.tokenize(text);
        let unique: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();

        let mut evidence: Vec<TokenEvidence<'_>> = unique
            .into_iter()
            .map(|token| {
                let spam_likelihood =
                    (state.count(TrainingClass::Spam, token) + 1) as f64 / spam_denominator;
                let ham_likelihood =
                    (state.count(TrainingClass::Ham, token) + 1) as f64 / ham_denominator;
                let spam_mass = spam_prior * spam_likelihood;
                let p_spam_given_token = spam_mass / (spam_mass + ham_prior * ham_likelihood);
                TokenEvidence {
                    token,
                    spam_likelihood,
                    ham_likelihood,
                    interest: (p_spam_given_token - 0.5).abs(),
                }
            })
            .collect();

        if let Some(k) = self.top_k {
            evidence.sort_by(|a, b| {
                b.interest
                    .total_cmp(&a.interest)
                    .then_with(|| a.token.cmp(b.token))
            });
            evidence.truncate(k);
        }

        let mut log_spam = spam_prior.ln();
        let mut log_ham = ham_prior.ln();
        for e in &evidence {
            log_spam += e.spam_likelihood.ln();
            log_ham += e.ham_likelihood.ln();
        }

        let p_spam = posterior_from_log_odds(log_spam - log_ham);
        ClassificationResult::new(p_spam >= self.spam_threshold, p_spam)
            .with_latency(start.elapsed().as_micros() as u64)
    }
}
