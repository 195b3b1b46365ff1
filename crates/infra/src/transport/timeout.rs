//! Timeout decorator for any [`BatchTransport`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailwire_core::{BatchRequest, BatchTransport, SessionHandle};
use mailwire_domain::{BatchResult, MailwireError, Result};
use tracing::warn;

/// Bounds every login and batch submission by a fixed duration.
///
/// An elapsed call surfaces as [`MailwireError::Timeout`], which the write
/// cache treats like any other transport failure.
pub struct TimeoutTransport {
    inner: Arc<dyn BatchTransport>,
    timeout: Duration,
}

impl TimeoutTransport {
    pub fn new(inner: Arc<dyn BatchTransport>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl BatchTransport for TimeoutTransport {
    async fn login(&self, token: &str) -> Result<SessionHandle> {
        tokio::time::timeout(self.timeout, self.inner.login(token)).await.map_err(|_| {
            warn!(timeout_ms = self.timeout.as_millis(), "login timed out");
            MailwireError::Timeout(self.timeout)
        })?
    }

    async fn submit_batch(
        &self,
        session: &SessionHandle,
        request: &BatchRequest,
    ) -> Result<BatchResult> {
        tokio::time::timeout(self.timeout, self.inner.submit_batch(session, request))
            .await
            .map_err(|_| {
                warn!(
                    entity = %request.entity,
                    operation = %request.operation,
                    timeout_ms = self.timeout.as_millis(),
                    "batch submission timed out"
                );
                MailwireError::Timeout(self.timeout)
            })?
    }
}

#[cfg(test)]
mod tests {
    use mailwire_core::testing::StubTransport;
    use mailwire_domain::{field_map, Operation};
    use serde_json::json;

    use super::*;

    /// Transport that never answers.
    struct Silent;

    #[async_trait]
    impl BatchTransport for Silent {
        async fn login(&self, _token: &str) -> Result<SessionHandle> {
            std::future::pending().await
        }

        async fn submit_batch(
            &self,
            _session: &SessionHandle,
            _request: &BatchRequest,
        ) -> Result<BatchResult> {
            std::future::pending().await
        }
    }

    fn request() -> BatchRequest {
        BatchRequest::write(
            "Contact",
            Operation::Add,
            "addContacts",
            vec![field_map([("email", json!("a@b.com"))])],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_submission_is_timeout_error() {
        let transport = TimeoutTransport::new(Arc::new(Silent), Duration::from_secs(30));
        let err = transport
            .submit_batch(&SessionHandle::new("s"), &request())
            .await
            .unwrap_err();
        assert_eq!(err, MailwireError::Timeout(Duration::from_secs(30)));
        assert!(err.is_transport());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_login_is_timeout_error() {
        let transport = TimeoutTransport::new(Arc::new(Silent), Duration::from_secs(5));
        let err = transport.login("token").await.unwrap_err();
        assert!(matches!(err, MailwireError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let stub = Arc::new(StubTransport::new());
        let transport = TimeoutTransport::new(stub.clone(), Duration::from_secs(5));
        let session = transport.login("token").await.unwrap();
        let result = transport.submit_batch(&session, &request()).await.unwrap();
        assert_eq!(result.count(), 1);
        assert_eq!(stub.call_count(), 1);
        assert_eq!(stub.logins(), vec!["token".to_string()]);
    }
}
