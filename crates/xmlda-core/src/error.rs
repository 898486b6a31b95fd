//! Errors reported by XML-DA service implementations

use thiserror::Error;

/// Result type for service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that can occur while talking to an XML-DA server
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The server could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a fault
    #[error("Server fault {code}: {message}")]
    Fault { code: String, message: String },

    /// The reply could not be interpreted
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Any other transport level failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ServiceError {
    /// Create a server fault from a result code and message
    pub fn fault(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            code: code.into(),
            message: message.into(),
        }
    }
}
