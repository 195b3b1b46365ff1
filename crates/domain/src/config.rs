//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_RETRY_DIR_NAME, DEFAULT_RETRY_LIMIT,
};
use crate::errors::{MailwireError, Result};
use crate::impl_wire_name_conversions;

/// Which retry store backs the write cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryerKind {
    File,
    #[default]
    None,
}

impl_wire_name_conversions!(RetryerKind {
    File => "file",
    None => "none",
});

/// Retry store selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryerConfig {
    #[serde(rename = "type")]
    pub kind: RetryerKind,
    /// Base directory for the file store; the system temp dir when unset.
    pub path: Option<PathBuf>,
}

impl RetryerConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self { kind: RetryerKind::File, path: Some(path.into()) }
    }

    /// Directory the file store writes to.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_RETRY_DIR_NAME))
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Re-read every record after a successful save.
    pub refresh_on_save: bool,
    /// Replay attempts before a stored unit is left alone.
    pub retry_limit: u32,
    pub retryer: RetryerConfig,
    /// Capture the last request/response exchange on the session.
    pub debug: bool,
    pub connection_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            refresh_on_save: false,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retryer: RetryerConfig::default(),
            debug: false,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_timeout_secs == 0 {
            return Err(MailwireError::Config(
                "connection_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.retryer.kind == RetryerKind::File && self.retry_limit == 0 {
            return Err(MailwireError::Config(
                "retry_limit must be greater than zero when a retryer is configured".to_string(),
            ));
        }
        if self.api_token.as_deref().is_some_and(|token| token.trim().is_empty()) {
            return Err(MailwireError::Config("api_token must not be blank".to_string()));
        }
        Ok(())
    }
}
