//! Background worker lifecycle errors

use std::time::Duration;

use thiserror::Error;

/// Errors from starting or stopping a background worker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("Worker already running")]
    AlreadyRunning,

    #[error("Worker not running")]
    NotRunning,

    #[error("Worker task panicked: {0}")]
    Panicked(String),

    #[error("Worker task did not stop within {0:?}")]
    JoinTimeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(WorkerError::NotRunning.to_string(), "Worker not running");
        assert_eq!(
            WorkerError::JoinTimeout(Duration::from_secs(5)).to_string(),
            "Worker task did not stop within 5s"
        );
    }
}
