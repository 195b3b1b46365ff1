//! Error types used throughout the client
//!
//! A single tagged enumeration covers every failure the client can report.
//! Entity names and remote error codes travel as data so callers can match
//! on the kind and still inspect the remote detail.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad classification of a [`MailwireError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller misuse (missing lookup key, read-only record, unsupported verb)
    Misuse,
    /// Structured per-item error returned by the remote side
    Remote,
    /// The call could not complete (network, auth, timeout, protocol)
    Transport,
    /// Durable retry storage failed
    Storage,
    /// Invalid configuration or input
    Configuration,
    /// Encoding or decoding failed
    Data,
}

/// Main error type for the client
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum MailwireError {
    #[error("{entity}: no usable lookup key present")]
    LookupKeyMissing { entity: String },

    #[error("{entity} record is immutable: {message}")]
    ImmutableRecord { entity: String, message: String },

    #[error("{entity} does not support {operation}")]
    UnsupportedOperation { entity: String, operation: String },

    #[error("{entity} remote error {code}: {message}")]
    RemoteApplication { entity: String, code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Retry store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MailwireError {
    pub fn lookup_key_missing(entity: impl Into<String>) -> Self {
        Self::LookupKeyMissing { entity: entity.into() }
    }

    pub fn immutable(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImmutableRecord { entity: entity.into(), message: message.into() }
    }

    pub fn unsupported(entity: impl Into<String>, operation: impl ToString) -> Self {
        Self::UnsupportedOperation { entity: entity.into(), operation: operation.to_string() }
    }

    pub fn remote(entity: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::RemoteApplication { entity: entity.into(), code, message: message.into() }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::LookupKeyMissing { .. }
            | Self::ImmutableRecord { .. }
            | Self::UnsupportedOperation { .. } => ErrorCategory::Misuse,
            Self::RemoteApplication { .. } => ErrorCategory::Remote,
            Self::Transport(_) | Self::Auth(_) | Self::Timeout(_) => ErrorCategory::Transport,
            Self::StoreUnavailable(_) => ErrorCategory::Storage,
            Self::NotFound(_) | Self::InvalidInput(_) | Self::Config(_) => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) => ErrorCategory::Data,
        }
    }

    /// Transport-class failures are the only ones handed to the retry store.
    pub fn is_transport(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    /// Check if this error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transport()
    }

    /// Remote error code, when the remote side reported one
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::RemoteApplication { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Short stable label for structured logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::LookupKeyMissing { .. } => "lookup_key_missing",
            Self::ImmutableRecord { .. } => "immutable_record",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::RemoteApplication { .. } => "remote_application",
            Self::Transport(_) => "transport",
            Self::Auth(_) => "auth",
            Self::Timeout(_) => "timeout",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for MailwireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, MailwireError>;
