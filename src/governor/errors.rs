//! Error handling for the command governor

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Result type for governor operations
pub type GovernorResult<T> = Result<T, GovernorError>;

/// Governor error types
#[derive(Debug)]
pub enum GovernorError {
    /// Command rejected by the security policy
    ValidationRejected(String),

    /// Process could not be started, or exited unsuccessfully
    ExecutionFailed {
        command: String,
        source: Box<dyn Error + Send + Sync>,
    },

    /// Subprocess or model call exceeded its deadline
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Language model call failed or returned something unusable
    TranslationFailed(String),

    /// Invalid configuration
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    SerializationError(serde_json::Error),

    /// HTTP transport error
    HttpError(reqwest::Error),

    /// IO error
    IoError(std::io::Error),
}

impl GovernorError {
    /// Create a validation rejected error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::ValidationRejected(reason.into())
    }

    /// Create an execution failed error
    pub fn execution_failed(
        command: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::ExecutionFailed {
            command: command.into(),
            source: source.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a translation failed error
    pub fn translation_failed(message: impl Into<String>) -> Self {
        Self::TranslationFailed(message.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Whether the error came from the security policy
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ValidationRejected(_))
    }
}

impl fmt::Display for GovernorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationRejected(reason) => write!(f, "{}", reason),
            Self::ExecutionFailed { command, source } => {
                write!(f, "Command '{}' failed: {}", command, source)
            }
            Self::Timeout { operation, duration } => {
                write!(f, "'{}' timed out after {:?}", operation, duration)
            }
            Self::TranslationFailed(msg) => write!(f, "Translation failed: {}", msg),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::SerializationError(e) => write!(f, "Serialization error: {}", e),
            Self::HttpError(e) => write!(f, "HTTP error: {}", e),
            Self::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl Error for GovernorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ExecutionFailed { source, .. } => Some(source.as_ref() as &(dyn Error + 'static)),
            Self::SerializationError(e) => Some(e),
            Self::HttpError(e) => Some(e),
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GovernorError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError(error)
    }
}

impl From<std::io::Error> for GovernorError {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(error)
    }
}

impl From<reqwest::Error> for GovernorError {
    fn from(error: reqwest::Error) -> Self {
        Self::HttpError(error)
    }
}

impl From<toml::de::Error> for GovernorError {
    fn from(error: toml::de::Error) -> Self {
        Self::InvalidConfiguration(error.to_string())
    }
}

impl From<regex::Error> for GovernorError {
    fn from(error: regex::Error) -> Self {
        Self::InvalidConfiguration(format!("invalid pattern: {}", error))
    }
}
