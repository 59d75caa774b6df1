//! Error types for handler failures

use thiserror::Error;

/// Handler failures. Dispatch reports a failing or panicking handler as
/// `HandlerFailed`; handlers may return either variant themselves.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Unexpected payload on '{channel}': {reason}")]
    UnexpectedPayload { channel: String, reason: String },
}
