//! Error types for the table model and document rules.

use thiserror::Error;

/// Configuration or table-shape error. Fatal at startup, never per-request.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Reading config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid YAML or does not match the expected shape
    #[error("Parsing config file: {0}")]
    Parse(String),

    /// Config parsed but violates a structural rule
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Canonical structure could not be serialized for hashing
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConfigError {
    /// Create an invalid-configuration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// An addressed key value or a document object key broke the naming rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key value must not be empty")]
    Empty,

    #[error("key value must not exceed {max} characters")]
    TooLong { max: usize },

    #[error("key value {value:?} must match {rule}")]
    InvalidValue { value: String, rule: &'static str },

    #[error("key value {value:?} does not match pattern {pattern:?}")]
    PatternMismatch { value: String, pattern: String },

    #[error("invalid JSON key {key:?} at path {path:?}")]
    InvalidJsonKey { key: String, path: String },
}

/// Document rejected by a [`crate::DocumentValidator`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("validation failed: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
