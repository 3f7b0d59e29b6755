//! Core types for spamwall

use crate::label::{Label, Provenance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Classification boundary: a chat group, or a reserved sentinel scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub i64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a training example, monotonic per store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleId(pub u64);

impl fmt::Display for ExampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which facet of a message is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Message text
    Content,
    /// Sender display name
    Username,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Username => "username",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex SHA-256 of the exact text, used as the memoization key
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sender identity as seen when a message arrived
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSnapshot {
    /// Platform user id
    pub id: i64,

    pub first_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Platform handle, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl SenderSnapshot {
    /// Create a sender with just an id and first name
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: None,
            username: None,
        }
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// First and last name joined by a space, the value judged for the username target
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() && !self.first_name.is_empty() => {
                format!("{} {}", self.first_name, last)
            }
            Some(last) if !last.is_empty() => last.to_string(),
            _ => self.first_name.clone(),
        }
    }
}

/// An inbound chat message handed to the detection pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Chat the message was posted in
    pub scope: ScopeId,

    /// Chat title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,

    /// Platform message id
    #[serde(default)]
    pub message_id: i64,

    pub sender: SenderSnapshot,

    /// Primary message text
    #[serde(default)]
    pub text: String,

    /// Extracted contextual markers (forwarded, quoted, has image, ...),
    /// appended to the searchable text as pseudo-tokens
    #[serde(default)]
    pub signals: Vec<String>,
}

impl InboundMessage {
    /// Create a message with no contextual signals
    pub fn new(scope: ScopeId, sender: SenderSnapshot, text: impl Into<String>) -> Self {
        Self {
            scope,
            scope_name: None,
            message_id: 0,
            sender,
            text: text.into(),
            signals: Vec::new(),
        }
    }

    pub fn with_scope_name(mut self, name: impl Into<String>) -> Self {
        self.scope_name = Some(name.into());
        self
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_signal(mut self, signal: impl Into<String>) -> Self {
        self.signals.push(signal.into());
        self
    }
}

/// A judged message or username, as stored in the example log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: ExampleId,

    /// Chat the text was seen in
    pub scope: ScopeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,

    /// Exact text judged
    pub text: String,

    /// [`fingerprint`] of `text`
    pub fingerprint: String,

    pub target: Target,

    pub label: Label,

    pub provenance: Provenance,

    /// Originating platform message id
    #[serde(default)]
    pub message_id: i64,

    pub sender: SenderSnapshot,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A training example that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExample {
    pub scope: ScopeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,

    pub text: String,

    pub target: Target,

    pub label: Label,

    #[serde(default)]
    pub provenance: Provenance,

    #[serde(default)]
    pub message_id: i64,

    #[serde(default)]
    pub sender: SenderSnapshot,
}

impl NewExample {
    /// Create a new example for `text`
    pub fn new(scope: ScopeId, target: Target, text: impl Into<String>, label: Label) -> Self {
        Self {
            scope,
            scope_name: None,
            text: text.into(),
            target,
            label,
            provenance: Provenance::default(),
            message_id: 0,
            sender: SenderSnapshot::default(),
        }
    }

    pub fn with_scope_name(mut self, name: Option<String>) -> Self {
        self.scope_name = name;
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_sender(mut self, sender: SenderSnapshot) -> Self {
        self.sender = sender;
        self
    }

    /// Stamp an id and timestamps onto this example
    pub fn into_example(self, id: ExampleId, now: DateTime<Utc>) -> TrainingExample {
        TrainingExample {
            id,
            scope: self.scope,
            scope_name: self.scope_name,
            fingerprint: fingerprint(&self.text),
            text: self.text,
            target: self.target,
            label: self.label,
            provenance: self.provenance,
            message_id: self.message_id,
            sender: self.sender,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Active ban of one sender in one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanRecord {
    pub scope: ScopeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,

    pub sender: SenderSnapshot,

    /// Text of the message that crossed the threshold
    pub spam_text: String,

    #[serde(default)]
    pub message_id: i64,

    pub banned_at: DateTime<Utc>,
}

/// Outcome of running a message through the detection pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub is_spam: bool,

    /// Facet that triggered, `None` when nothing did
    pub target: Option<Target>,

    pub p_spam: f64,
}

impl DetectionResult {
    /// Neutral non-spam result
    pub fn non_spam() -> Self {
        Self {
            is_spam: false,
            target: None,
            p_spam: 0.0,
        }
    }

    /// Spam result for a target
    pub fn spam(target: Target, p_spam: f64) -> Self {
        Self {
            is_spam: true,
            target: Some(target),
            p_spam,
        }
    }
}
