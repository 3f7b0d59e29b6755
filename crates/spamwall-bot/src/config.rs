//! Bot configuration

use serde::{Deserialize, Serialize};
use spamwall_classifiers::ClassifierConfig;
use spamwall_store::SnapshotConfig;
use spamwall_training::TrainingConfig;
use std::path::Path;

/// Bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Tokenizer, classifiers, and detection
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Batching and moderation
    #[serde(default)]
    pub training: TrainingConfig,

    /// Store persistence
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl BotConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(snapshot) = &cli.snapshot {
            config.snapshot.path = snapshot.clone();
        }

        if let Some(dict) = &cli.user_dict {
            config.classifier.tokenizer.user_dict = Some(dict.clone());
        }

        if cli.inline_training {
            config.training.moderation.inline_training = true;
        }

        config.classifier.validate()?;
        config.training.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
