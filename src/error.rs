use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned a malformed response: {0}")]
    Malformed(String),

    #[error("no API key configured for provider '{0}'; set OPENAI_API_KEY or pass --api-key")]
    MissingCredentials(String),
}

impl ProviderError {
    /// Timeouts, rate limits, server errors and dropped connections are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::MissingCredentials(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("embedding dimension mismatch: expected {expected} values, record '{record_id}' has {got}")]
    DataIntegrity {
        record_id: String,
        expected: usize,
        got: usize,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RagError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
