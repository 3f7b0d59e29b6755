//! Persisted aggregate counters of one Bayesian classifier scope

use crate::label::TrainingClass;
use crate::types::{ScopeId, Target};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Word and message counters for one scope.
///
/// `vocabulary_size` always equals the number of distinct tokens keyed in
/// either `spam_counts` or `ham_counts`; [`ClassifierState::absorb`] keeps it
/// current without rescanning the maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierState {
    pub scope: ScopeId,

    pub display_name: String,

    /// Facet this scope classifies
    pub target: Target,

    #[serde(default)]
    pub spam_counts: HashMap<String, u64>,

    #[serde(default)]
    pub ham_counts: HashMap<String, u64>,

    #[serde(default)]
    pub total_spam_words: u64,

    #[serde(default)]
    pub total_ham_words: u64,

    #[serde(default)]
    pub total_spam_messages: u64,

    #[serde(default)]
    pub total_ham_messages: u64,

    #[serde(default)]
    pub vocabulary_size: u64,

    /// Optional language tag of the chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl ClassifierState {
    /// Create an all-zero state
    pub fn empty(scope: ScopeId, display_name: impl Into<String>, target: Target) -> Self {
        Self {
            scope,
            display_name: display_name.into(),
            target,
            spam_counts: HashMap::new(),
            ham_counts: HashMap::new(),
            total_spam_words: 0,
            total_ham_words: 0,
            total_spam_messages: 0,
            total_ham_messages: 0,
            vocabulary_size: 0,
            language: None,
            updated_at: Utc::now(),
        }
    }

    /// Deep-copy the counters of `template` into a new state for `scope`
    pub fn seeded_from(
        template: &ClassifierState,
        scope: ScopeId,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            display_name: display_name.into(),
            target: template.target,
            spam_counts: template.spam_counts.clone(),
            ham_counts: template.ham_counts.clone(),
            total_spam_words: template.total_spam_words,
            total_ham_words: template.total_ham_words,
            total_spam_messages: template.total_spam_messages,
            total_ham_messages: template.total_ham_messages,
            vocabulary_size: template.vocabulary_size,
            language: None,
            updated_at: Utc::now(),
        }
    }

    /// Zero every counter, keeping identity fields
    pub fn reset(&mut self) {
        self.spam_counts.clear();
        self.ham_counts.clear();
        self.total_spam_words = 0;
        self.total_ham_words = 0;
        self.total_spam_messages = 0;
        self.total_ham_messages = 0;
        self.vocabulary_size = 0;
    }

    /// Record one message of `class` made of `tokens`
    pub fn absorb(&mut self, class: TrainingClass, tokens: &[String]) {
        let token_count = tokens.len() as u64;
        match class {
            TrainingClass::Spam => {
                self.total_spam_messages += 1;
                self.total_spam_words += token_count;
            }
            TrainingClass::Ham => {
                self.total_ham_messages += 1;
                self.total_ham_words += token_count;
            }
        }

        for token in tokens {
            let seen = self.spam_counts.contains_key(token) || self.ham_counts.contains_key(token);
            let counts = match class {
                TrainingClass::Spam => &mut self.spam_counts,
                TrainingClass::Ham => &mut self.ham_counts,
            };
            *counts.entry(token.clone()).or_insert(0) += 1;
            if !seen {
                self.vocabulary_size += 1;
            }
        }
    }

    /// Either class has no trained messages, so the model has no opinion
    pub fn is_cold(&self) -> bool {
        self.total_spam_messages == 0 || self.total_ham_messages == 0
    }

    pub fn count(&self, class: TrainingClass, token: &str) -> u64 {
        let counts = match class {
            TrainingClass::Spam => &self.spam_counts,
            TrainingClass::Ham => &self.ham_counts,
        };
        counts.get(token).copied().unwrap_or(0)
    }

    pub fn total_words(&self, class: TrainingClass) -> u64 {
        match class {
            TrainingClass::Spam => self.total_spam_words,
            TrainingClass::Ham => self.total_ham_words,
        }
    }

    pub fn total_messages(&self, class: TrainingClass) -> u64 {
        match class {
            TrainingClass::Spam => self.total_spam_messages,
            TrainingClass::Ham => self.total_ham_messages,
        }
    }

    /// Recount distinct tokens across both maps
    pub fn distinct_vocabulary(&self) -> u64 {
        let vocabulary: HashSet<&String> =
            self.spam_counts.keys().chain(self.ham_counts.keys()).collect();
        vocabulary.len() as u64
    }

    /// Most frequent spam tokens, highest count first
    pub fn top_spam_words(&self, limit: usize) -> Vec<(String, u64)> {
        top_words(&self.spam_counts, limit)
    }

    /// Most frequent ham tokens, highest count first
    pub fn top_ham_words(&self, limit: usize) -> Vec<(String, u64)> {
        top_words(&self.ham_counts, limit)
    }
}

fn top_words(counts: &HashMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut words: Vec<(String, u64)> = counts.iter().map(|(w, c)| (w.clone(), *c)).collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(limit);
    words
}
