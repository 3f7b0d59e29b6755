//! Script-aware text normalizer and tokenizer
//!
//! Normalization defeats the usual evasion tricks before segmentation:
//! - decorative separators inside words (`合-约` becomes `合约`)
//! - spaces between CJK characters (`想 赚 钱` becomes `想赚钱`)
//!
//! and then spaces CJK/Latin boundaries so each script is segmented on its own.
//! CJK runs are segmented with jieba, optionally extended by a user dictionary
//! of domain jargon.

use jieba_rs::Jieba;
use regex::Regex;
use spamwall_core::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Word characters: letters and digits of any script, plus every Han character
const WORD: &str = r"[\p{Alphabetic}\p{Nd}\p{Han}]";

/// Letters and digits outside the Han script
const NON_CJK_WORD: &str = r"[\p{Alphabetic}\p{Nd}--\p{Han}]";

/// Punctuation and symbols, leaving emoji to their own class
const PUNCT: &str = r"[\p{P}\p{S}--\p{Emoji_Presentation}]";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::tokenizer(format!("Failed to compile pattern {}: {}", pattern, e)))
}

/// Replace until the text stops changing
fn replace_to_fixpoint(regex: &Regex, text: String, replacement: &str) -> String {
    let mut current = text;
    loop {
        let next = regex.replace_all(&current, replacement).into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Deterministic text normalizer
pub struct TextNormalizer {
    separator: Regex,
    cjk_gap: Regex,
    cjk_then_word: Regex,
    word_then_cjk: Regex,
    whitespace: Regex,
}

impl TextNormalizer {
    /// Create a new normalizer
    pub fn new() -> Result<Self> {
        Ok(Self {
            separator: compile(&format!(
                r"({WORD})[^\p{{Alphabetic}}\p{{Nd}}\p{{Han}}\s]+({WORD})"
            ))?,
            cjk_gap: compile(r"(\p{Han})\s+(\p{Han})")?,
            cjk_then_word: compile(&format!(r"(\p{{Han}})({NON_CJK_WORD})"))?,
            word_then_cjk: compile(&format!(r"({NON_CJK_WORD})(\p{{Han}})"))?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Normalize `text`. Idempotent: normalizing the output again changes nothing.
    pub fn normalize(&self, text: &str) -> String {
        let text = replace_to_fixpoint(&self.separator, text.trim().to_string(), "${1}${2}");
        let text = replace_to_fixpoint(&self.cjk_gap, text, "${1}${2}");

        let text = self.cjk_then_word.replace_all(&text, "${1} ${2}");
        let text = self.word_then_cjk.replace_all(&text, "${1} ${2}");

        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

/// Text to token sequence, for training and classification
pub struct Tokenizer {
    normalizer: TextNormalizer,
    jieba: Jieba,
    segment: Regex,
    pure_punct: Regex,
    pure_number: Regex,
}

impl Tokenizer {
    /// Create a tokenizer with jieba's bundled dictionary
    pub fn new() -> Result<Self> {
        Self::with_jieba(Jieba::new())
    }

    /// Create a tokenizer whose CJK segmenter also knows the words in `path`
    /// (jieba dictionary format: `word [freq] [tag]` per line)
    pub fn with_user_dict(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut jieba = Jieba::new();
        let mut reader = BufReader::new(File::open(path)?);
        jieba.load_dict(&mut reader).map_err(|e| {
            Error::tokenizer(format!("Failed to load user dictionary {:?}: {}", path, e))
        })?;
        info!("Jieba segmenter initialized with user dictionary {:?}", path);
        Self::with_jieba(jieba)
    }

    /// Use the user dictionary when it exists, the bundled one otherwise
    pub fn from_optional_dict(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::with_user_dict(path),
            Some(path) => {
                warn!("User dictionary not found at {:?}, using default dictionary", path);
                Self::new()
            }
            None => Self::new(),
        }
    }

    fn with_jieba(jieba: Jieba) -> Result<Self> {
        Ok(Self {
            normalizer: TextNormalizer::new()?,
            jieba,
            segment: compile(&format!(
                r"(?P<emoji>\p{{Emoji_Presentation}}+)|(?P<cjk>\p{{Han}}+)|(?P<word>{NON_CJK_WORD}+)|(?P<punct>{PUNCT}+)"
            ))?,
            pure_punct: compile(&format!(r"^{PUNCT}+$"))?,
            pure_number: compile(r"^[\p{Nd}一二三四五六七八九十百千万亿零]+$")?,
        })
    }

    /// Normalized form of `text`, as fed to segmentation
    pub fn normalize(&self, text: &str) -> String {
        self.normalizer.normalize(text)
    }

    /// Split `text` into lower-cased tokens. Never fails; characters outside the
    /// recognized classes are dropped.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = self.normalizer.normalize(text);
        let mut candidates: Vec<&str> = Vec::new();

        for caps in self.segment.captures_iter(&normalized) {
            if let Some(run) = caps.name("emoji") {
                let run = run.as_str();
                candidates.extend(run.char_indices().map(|(i, c)| &run[i..i + c.len_utf8()]));
            } else if let Some(run) = caps.name("cjk") {
                candidates.extend(self.jieba.cut(run.as_str(), true));
            } else if let Some(run) = caps.name("word").or_else(|| caps.name("punct")) {
                candidates.push(run.as_str());
            }
        }

        candidates
            .into_iter()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .filter(|token| !self.pure_punct.is_match(token))
            .filter(|token| !self.pure_number.is_match(token))
            .map(str::to_lowercase)
            .collect()
    }
}
