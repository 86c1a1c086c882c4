//! Error types for SafeChat

use std::path::PathBuf;

/// Result type alias using SafeChat's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SafeChat operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The prompt file given on the command line does not exist
    #[error("Provided Prompt file does not exist {}", .0.display())]
    InputNotFound(PathBuf),

    /// Dialog input could not be parsed
    #[error("input parse error: {0}")]
    InputParse(String),

    /// Neither a prompt file nor piped input was provided
    #[error("no user prompt provided")]
    NoInput,

    /// The user prompt of a dialog was flagged by at least one checker
    #[error("user prompt of dialog {dialog} deemed unsafe")]
    UnsafeInput {
        /// Zero-based index of the offending dialog
        dialog: usize,
    },

    /// Model loading or generation errors
    #[error("model error: {0}")]
    Model(String),

    /// Safety checker execution errors
    #[error("checker error: {0}")]
    Checker(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors
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
    /// Create a new input parse error
    pub fn input_parse(msg: impl Into<String>) -> Self {
        Self::InputParse(msg.into())
    }

    /// Create a new model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new checker error
    pub fn checker(msg: impl Into<String>) -> Self {
        Self::Checker(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error stems from resolving the dialog input
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InputNotFound(_) | Self::InputParse(_) | Self::NoInput
        )
    }
}
