//! Error types for the voice journal

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the voice journal
#[derive(Error, Debug)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by language-model and speech-synthesis providers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    Protocol(String),

    #[error("Model stream failed: {0}")]
    Generation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Stream ended without a terminal event")]
    Truncated,
}

/// Errors raised by the turn-persistence sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
