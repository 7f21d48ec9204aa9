//! Error types for turngate.

pub mod unified;

pub use unified::{is_abort_message, ErrorCategory};

use thiserror::Error;

/// Primary error type for all turngate operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Settings file error: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl BridgeError {
    /// Create a stream fault from any displayable transport error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Aborted(_) => ErrorCategory::Abort,
            Self::Stream(message) if is_abort_message(message) => ErrorCategory::Abort,
            Self::Stream(_) => ErrorCategory::Stream,
            Self::Configuration(_) | Self::Settings(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is the signature of a user-initiated abort.
    pub fn is_user_abort(&self) -> bool {
        matches!(self.category(), ErrorCategory::Abort)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
