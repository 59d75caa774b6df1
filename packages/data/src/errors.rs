//! Error types for data handling

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Validation failed for '{field}': {}", .messages.join("; "))]
    Validation {
        field: String,
        messages: Vec<String>,
    },

    #[error("Invalid data: {}", .messages.join("; "))]
    InvalidData { messages: Vec<String> },

    #[error("Invalid model definition: {0}")]
    Schema(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed {format} payload: {reason}")]
    Parse { format: String, reason: String },

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Migration step already registered: {0}")]
    MigrationStepConflict(String),

    #[error("Migration step '{step}' failed, data rolled back")]
    MigrationFailed {
        step: String,
        #[source]
        source: Box<DataError>,
        /// Data after rolling back the steps that had already run
        restored: Value,
    },

    #[error("Rollback through step '{step}' failed")]
    RollbackFailed {
        step: String,
        #[source]
        source: Box<DataError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DataError {
    pub(crate) fn parse(format: impl Into<String>, reason: impl ToString) -> Self {
        DataError::Parse {
            format: format.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
