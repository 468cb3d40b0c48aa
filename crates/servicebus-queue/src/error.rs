//! Error types for queue operations.

use std::fmt;
use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to sign authorization token: {message}")]
    AuthSigningFailure { message: String },

    #[error("Failed to push message: HTTP {status}. Response: {body}")]
    PushRejected { status: u16, body: String },

    #[error("Failed to {operation} message: HTTP {status}. Response: {body}")]
    LeaseOperationFailed {
        operation: LeaseOperation,
        status: u16,
        body: String,
    },

    #[error(
        "Queue could not be cleared after {deleted} of {expected} deletions: {}. Response: {body}",
        describe_status(.status)
    )]
    ClearAborted {
        deleted: u64,
        expected: u64,
        status: Option<u16>,
        body: String,
    },

    #[error("Malformed broker response: {message}")]
    MalformedResponse { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Credential cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the caller may retry the operation
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AuthSigningFailure { .. } => false,
            Self::PushRejected { status, .. } => is_transient_status(*status),
            Self::LeaseOperationFailed { status, .. } => is_transient_status(*status),
            Self::ClearAborted { status, .. } => status.map_or(true, is_transient_status),
            Self::MalformedResponse { .. } => false,
            Self::Transport(e) => e.is_transient(),
            Self::Cache(_) => true,
            Self::Configuration(_) => false,
            Self::Serialization(_) => false,
            Self::Validation(_) => false,
        }
    }

    /// HTTP status reported by the broker, if the failure carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::PushRejected { status, .. } => Some(*status),
            Self::LeaseOperationFailed { status, .. } => Some(*status),
            Self::ClearAborted { status, .. } => *status,
            _ => None,
        }
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!("HTTP {}", status),
        None => "no response".to_string(),
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Settlement operation performed against a lock location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOperation {
    Delete,
    Release,
}

impl fmt::Display for LeaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Release => write!(f, "unlock"),
        }
    }
}

/// Failures raised by the HTTP transport before a response was available
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl TransportError {
    /// Check if the transport failure is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::RequestFailed { .. } => true,
            Self::InvalidRequest { .. } => false,
        }
    }
}

/// Credential cache failures
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache operation failed: {message}")]
    OperationFailed { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Queue connection '{name}' is not configured")]
    UnknownConnection { name: String },

    #[error("Queue driver '{driver}' is not registered")]
    UnsupportedDriver { driver: String },
}

/// Errors during payload serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Payload is not valid JSON: {message}")]
    InvalidPayload { message: String },

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
