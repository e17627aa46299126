//! Error types for alert store operations

use std::fmt;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the alert store
#[derive(Debug)]
pub enum StoreError {
    /// Could not establish a connection
    ConnectionFailed(String),

    /// An operation was attempted before `connect` succeeded or after `close`
    NotConnected,

    /// The queried index does not exist
    IndexNotFound(String),

    /// The store rejected or failed a query
    QueryFailed(String),

    /// The store answered with something we could not interpret
    InvalidResponse(String),

    /// Invalid connection settings
    InvalidConfig(String),

    /// I/O error (CA bundle access, etc.)
    IoError(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to alert store: {}", msg)
            }
            StoreError::NotConnected => write!(f, "alert store is not connected"),
            StoreError::IndexNotFound(index) => write!(f, "index '{}' not found", index),
            StoreError::QueryFailed(msg) => write!(f, "store query failed: {}", msg),
            StoreError::InvalidResponse(msg) => write!(f, "invalid store response: {}", msg),
            StoreError::InvalidConfig(msg) => write!(f, "invalid store configuration: {}", msg),
            StoreError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            StoreError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::QueryFailed(err.to_string())
        }
    }
}
