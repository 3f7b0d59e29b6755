//! Configuration for the tokenizer, classifiers, and detection pipeline

use serde::{Deserialize, Serialize};
use spamwall_core::{Error, Result, ScopeId};
use std::path::PathBuf;

/// Configuration for all classifiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Naive Bayes settings
    #[serde(default)]
    pub bayes: BayesSettings,

    /// Tokenizer settings
    #[serde(default)]
    pub tokenizer: TokenizerSettings,

    /// Rule pre-filter settings
    #[serde(default)]
    pub rules: RuleSettings,

    /// Classifier scope layout
    #[serde(default)]
    pub scopes: ScopeSettings,

    /// Detection pipeline settings
    #[serde(default)]
    pub detection: DetectionSettings,
}

/// Naive Bayes settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesSettings {
    /// Minimum P(spam) for a spam verdict
    #[serde(default = "default_spam_threshold")]
    pub spam_threshold: f64,

    /// Only the k most decisive tokens contribute (`null` uses every token)
    #[serde(default = "default_top_k")]
    pub top_k: Option<usize>,

    /// Which examples a rebuild replays into a content scope
    #[serde(default)]
    pub replay: ReplayPolicy,
}

impl Default for BayesSettings {
    fn default() -> Self {
        Self {
            spam_threshold: default_spam_threshold(),
            top_k: default_top_k(),
            replay: ReplayPolicy::default(),
        }
    }
}

/// Example set replayed when rebuilding a content scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Every content example from every group
    #[default]
    Shared,
    /// Only the examples recorded in the rebuilt group
    Scope,
}

/// Tokenizer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenizerSettings {
    /// Extra jieba dictionary of domain jargon
    #[serde(default)]
    pub user_dict: Option<PathBuf>,
}

/// Rule pre-filter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fraction of Han characters followed by whitespace above which text is spam
    #[serde(default = "default_cjk_spacing_ratio")]
    pub cjk_spacing_ratio: f64,

    /// Texts with fewer Han characters are never flagged
    #[serde(default = "default_min_cjk_chars")]
    pub min_cjk_chars: usize,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cjk_spacing_ratio: default_cjk_spacing_ratio(),
            min_cjk_chars: default_min_cjk_chars(),
        }
    }
}

/// Classifier scope layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSettings {
    /// Reserved scope of the global username classifier
    #[serde(default = "default_username_scope")]
    pub username_scope: ScopeId,

    #[serde(default = "default_username_scope_name")]
    pub username_scope_name: String,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            username_scope: default_username_scope(),
            username_scope_name: default_username_scope_name(),
        }
    }
}

/// Detection pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Clean texts scoring below this while spam examples outnumber ham ones
    /// are recorded as `maybe_ham`
    #[serde(default = "default_ham_balance_p_spam")]
    pub ham_balance_p_spam: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            ham_balance_p_spam: default_ham_balance_p_spam(),
        }
    }
}

impl ClassifierConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Invalid classifier config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Reject values outside their meaningful range
    pub fn validate(&self) -> Result<()> {
        let probability = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(Error::config(format!("{} must be within 0.0..=1.0, got {}", name, value)))
            }
        };
        probability("bayes.spam_threshold", self.bayes.spam_threshold)?;
        probability("rules.cjk_spacing_ratio", self.rules.cjk_spacing_ratio)?;
        probability("detection.ham_balance_p_spam", self.detection.ham_balance_p_spam)?;

        if self.bayes.top_k == Some(0) {
            return Err(Error::config("bayes.top_k must be positive or null"));
        }
        Ok(())
    }
}

fn default_spam_threshold() -> f64 {
    0.94
}

fn default_top_k() -> Option<usize> {
    Some(15)
}

fn default_true() -> bool {
    true
}

fn default_cjk_spacing_ratio() -> f64 {
    0.8
}

fn default_min_cjk_chars() -> usize {
    5
}

fn default_username_scope() -> ScopeId {
    ScopeId(0)
}

fn default_username_scope_name() -> String {
    "Username Classifier".to_string()
}

fn default_ham_balance_p_spam() -> f64 {
    0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = ClassifierConfig::from_yaml("{}").unwrap();
        assert_eq!(config.bayes.spam_threshold, 0.94);
        assert_eq!(config.bayes.top_k, Some(15));
        assert_eq!(config.bayes.replay, ReplayPolicy::Shared);
        assert!(config.rules.enabled);
        assert_eq!(config.rules.min_cjk_chars, 5);
        assert_eq!(config.scopes.username_scope, ScopeId(0));
        assert_eq!(config.detection.ham_balance_p_spam, 0.1);
    }

    #[test]
    fn test_classifier_config_yaml() {
        let yaml = r#"
bayes:
  spam_threshold: 0.8
  top_k: null
  replay: scope

tokenizer:
  user_dict: ./dict/crypto.txt

rules:
  enabled: false
  cjk_spacing_ratio: 0.6

scopes:
  username_scope: -1
"#;

        let config = ClassifierConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.bayes.spam_threshold, 0.8);
        assert_eq!(config.bayes.top_k, None);
        assert_eq!(config.bayes.replay, ReplayPolicy::Scope);
        assert_eq!(config.tokenizer.user_dict, Some(PathBuf::from("./dict/crypto.txt")));
        assert!(!config.rules.enabled);
        assert_eq!(config.rules.min_cjk_chars, 5);
        assert_eq!(config.scopes.username_scope, ScopeId(-1));
        assert_eq!(config.scopes.username_scope_name, "Username Classifier");
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let err = ClassifierConfig::from_yaml("bayes:\n  spam_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(ClassifierConfig::from_yaml("bayes:\n  top_k: 0\n").is_err());
    }
}
