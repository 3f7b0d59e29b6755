//! Configuration for batching and moderation

use serde::{Deserialize, Serialize};
use spamwall_core::{Error, Result};
use std::time::Duration;

/// Configuration for the training side of the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub batching: BatchSettings,

    #[serde(default)]
    pub moderation: ModerationSettings,
}

/// Debounce settings for training batches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Flush as soon as this many events are pending
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush pending events older than this even when the batch is not full
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often the sweeper looks for expired windows
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            window_secs: default_window_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl BatchSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Ban escalation and label feedback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationSettings {
    /// Confident spam examples per (scope, sender) that trigger a ban
    #[serde(default = "default_ban_threshold")]
    pub ban_threshold: usize,

    /// Train confident spam examples immediately instead of waiting for the batch
    #[serde(default)]
    pub inline_training: bool,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            ban_threshold: default_ban_threshold(),
            inline_training: false,
        }
    }
}

impl TrainingConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Invalid training config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batching.batch_size == 0 {
            return Err(Error::config("batching.batch_size must be at least 1"));
        }
        if self.batching.sweep_interval_ms == 0 {
            return Err(Error::config("batching.sweep_interval_ms must be positive"));
        }
        if self.moderation.ban_threshold == 0 {
            return Err(Error::config("moderation.ban_threshold must be at least 1"));
        }
        Ok(())
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_window_secs() -> u64 {
    30
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_ban_threshold() -> usize {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::from_yaml("{}").unwrap();
        assert_eq!(config.batching.batch_size, 100);
        assert_eq!(config.batching.window(), Duration::from_secs(30));
        assert_eq!(config.batching.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.moderation.ban_threshold, 3);
        assert!(!config.moderation.inline_training);
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
batching:
  window_secs: 300
moderation:
  inline_training: true
"#;
        let config = TrainingConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.batching.batch_size, 100);
        assert_eq!(config.batching.window_secs, 300);
        assert!(config.moderation.inline_training);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        assert!(TrainingConfig::from_yaml("batching:\n  batch_size: 0\n").is_err());
    }
}
