//! Error types for Whipper.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Session unusable: {0}")]
    SessionUnusable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Prompt '{id}' matched {matches} registry entries, expected exactly one")]
    AmbiguousPrompt { id: String, matches: usize },

    #[error("Gave up after {attempts} failed attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a batch run may recover from this error by resetting the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Timeout(_) | Error::Browser(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
