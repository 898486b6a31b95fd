//! Error types for XML-DA client operations

use thiserror::Error;

pub use xmlda_core::{ServiceError, ServiceResult};

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while setting up a connection
///
/// Polling failures are not reported through this type: pollers recover
/// from them internally and signal trouble through state changes.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to parse a configuration file
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A remote call failed
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}
