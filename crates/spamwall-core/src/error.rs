//! Error types for spamwall

/// Result type alias using spamwall's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for spamwall operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Persistence layer failures
    #[error("store error: {0}")]
    Store(String),

    /// Classifier training or scoring errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Tokenizer setup errors (dictionary loading)
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Job submission or execution errors
    #[error("job error: {0}")]
    Job(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new tokenizer error
    pub fn tokenizer(msg: impl Into<String>) -> Self {
        Self::Tokenizer(msg.into())
    }

    /// Create a new job error
    pub fn job(msg: impl Into<String>) -> Self {
        Self::Job(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
