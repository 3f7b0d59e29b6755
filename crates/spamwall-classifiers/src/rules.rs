//! Rule-based pre-filter (runs before any learned model)
//!
//! Spammers space out CJK characters (`想 赚 钱 的 朋 友`) to dodge keyword
//! filters. Ordinary CJK prose almost never puts whitespace after most of its
//! characters, so a high spaced-character ratio is a confident spam signal.

use crate::classifier::{ClassificationResult, Classifier};
use crate::config::RuleSettings;
use regex::Regex;
use spamwall_core::{Error, Result};
use std::time::Instant;

/// Counts of Han characters in a text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CjkSpacing {
    pub han_chars: usize,
    /// Han characters immediately followed by a whitespace character
    pub spaced_chars: usize,
}

impl CjkSpacing {
    pub fn ratio(&self) -> f64 {
        if self.han_chars == 0 {
            0.0
        } else {
            self.spaced_chars as f64 / self.han_chars as f64
        }
    }
}

/// Flags text whose CJK characters are mostly separated by whitespace
pub struct RuleBasedPreFilter {
    han_regex: Regex,
    ratio_threshold: f64,
    min_cjk_chars: usize,
}

impl RuleBasedPreFilter {
    /// Create a new pre-filter
    pub fn new(ratio_threshold: f64, min_cjk_chars: usize) -> Result<Self> {
        Ok(Self {
            han_regex: Regex::new(r"\p{Han}")
                .map_err(|e| Error::classifier(format!("Failed to compile Han regex: {}", e)))?,
            ratio_threshold,
            min_cjk_chars,
        })
    }

    pub fn from_settings(settings: &RuleSettings) -> Result<Self> {
        Self::new(settings.cjk_spacing_ratio, settings.min_cjk_chars)
    }

    /// Count Han characters and those followed by whitespace
    pub fn spacing(&self, text: &str) -> CjkSpacing {
        let mut spacing = CjkSpacing::default();
        for m in self.han_regex.find_iter(text) {
            spacing.han_chars += 1;
            if text[m.end()..].chars().next().is_some_and(char::is_whitespace) {
                spacing.spaced_chars += 1;
            }
        }
        spacing
    }

    /// Whether `text` trips the spacing rule
    pub fn is_spaced_cjk(&self, text: &str) -> bool {
        let spacing = self.spacing(text);
        spacing.han_chars >= self.min_cjk_chars && spacing.ratio() > self.ratio_threshold
    }
}

impl Default for RuleBasedPreFilter {
    fn default() -> Self {
        Self::from_settings(&RuleSettings::default()).expect("Failed to create rule pre-filter")
    }
}

#[async_trait::async_trait]
impl Classifier for RuleBasedPreFilter {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let start = Instant::now();

        let result = if self.is_spaced_cjk(text) {
            ClassificationResult::new(true, 1.0)
        } else {
            ClassificationResult::neutral()
        };

        Ok(result.with_latency(start.elapsed().as_micros() as u64))
    }

    fn name(&self) -> &str {
        "cjk_spacing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spaced_cjk_is_spam() {
        let filter = RuleBasedPreFilter::default();

        let result = filter.classify("想 赚 钱 的 朋 友 加 我").await.unwrap();
        assert!(result.is_spam);
        assert_eq!(result.p_spam, 1.0);
    }

    #[tokio::test]
    async fn test_ordinary_cjk_is_not_spam() {
        let filter = RuleBasedPreFilter::default();

        let result = filter.classify("今天天气很好，我们去公园吧").await.unwrap();
        assert!(!result.is_spam);
        assert_eq!(result.p_spam, 0.0);
    }

    #[tokio::test]
    async fn test_too_few_cjk_chars_never_flag() {
        let filter = RuleBasedPreFilter::default();

        // Fully spaced, but only four Han characters
        assert!(!filter.classify("你 好 世 界 ").await.unwrap().is_spam);
        assert!(!filter.classify("hello world").await.unwrap().is_spam);
        assert!(!filter.classify("").await.unwrap().is_spam);
    }

    #[test]
    fn test_ratio_must_exceed_threshold() {
        let filter = RuleBasedPreFilter::new(0.8, 5).unwrap();

        // 5 Han, 4 spaced: ratio 0.8 is not above the threshold
        let text = "一 二 三 四 五";
        assert_eq!(
            filter.spacing(text),
            CjkSpacing {
                han_chars: 5,
                spaced_chars: 4
            }
        );
        assert!(!filter.is_spaced_cjk(text));

        // A trailing space tips it over
        assert!(filter.is_spaced_cjk("一 二 三 四 五 "));
    }

    #[test]
    fn test_any_whitespace_counts_as_spacing() {
        let filter = RuleBasedPreFilter::default();
        assert!(filter.is_spaced_cjk("稳\t赚\n不\u{3000}亏 的 "));
    }
}
