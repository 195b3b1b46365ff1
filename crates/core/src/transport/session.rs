//! Authenticated session over a [`BatchTransport`]
//!
//! One session per client. Every submission holds the session lock for the
//! duration of the remote call, so batches never interleave on one session
//! header.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailwire_domain::{BatchResult, MailwireError, Result};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument, warn};

use super::ports::{BatchRequest, BatchTransport, SessionHandle};

/// Last request/response pair, kept when debug capture is enabled.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: BatchRequest,
    /// Batch result or the error the transport returned
    pub response: std::result::Result<BatchResult, MailwireError>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    handle: Option<SessionHandle>,
}

/// Lazily authenticated, serialized access to the remote API.
pub struct TransportSession {
    transport: Arc<dyn BatchTransport>,
    state: AsyncMutex<SessionState>,
    debug: bool,
    last_exchange: Mutex<Option<Exchange>>,
}

impl TransportSession {
    /// Unauthenticated session; `token` is used for the first lazy login.
    pub fn new(transport: Arc<dyn BatchTransport>, token: Option<String>, debug: bool) -> Self {
        Self {
            transport,
            state: AsyncMutex::new(SessionState { token, handle: None }),
            debug,
            last_exchange: Mutex::new(None),
        }
    }

    /// Log in with `token`, replacing any current session.
    #[instrument(skip(self, token))]
    pub async fn login(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let handle = self.transport.login(token).await?;
        state.token = Some(token.to_string());
        state.handle = Some(handle);
        debug!("session established");
        Ok(())
    }

    /// Replace the token; the next submission logs in again.
    pub async fn set_token(&self, token: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.token = Some(token.into());
        state.handle = None;
    }

    pub async fn token(&self) -> Option<String> {
        self.state.lock().await.token.clone()
    }

    /// Drop the current session handle.
    pub async fn reset(&self) {
        self.state.lock().await.handle = None;
        debug!("session reset");
    }

    /// True while a session handle is held.
    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.handle.is_some()
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Most recent exchange (debug mode only).
    pub fn last_exchange(&self) -> Option<Exchange> {
        self.last_exchange.lock().clone()
    }

    /// Submit one batch, logging in first when there is no session yet.
    ///
    /// An `Auth` failure from the remote side drops the session so the next
    /// call logs in again.
    #[instrument(
        skip(self, request),
        fields(
            request_id = %request.request_id,
            entity = %request.entity,
            method = %request.method,
            items = request.len()
        )
    )]
    pub async fn submit(&self, request: BatchRequest) -> Result<BatchResult> {
        let mut state = self.state.lock().await;

        let handle = match state.handle.clone() {
            Some(handle) => handle,
            None => {
                let token = state.token.clone().ok_or_else(|| {
                    MailwireError::Auth("no API token configured for this session".to_string())
                })?;
                let handle = self.transport.login(&token).await?;
                debug!("logged in lazily");
                state.handle = Some(handle.clone());
                handle
            }
        };

        let response = self.transport.submit_batch(&handle, &request).await;

        match &response {
            Ok(result) => {
                debug!(results = result.count(), has_errors = result.has_errors(), "batch completed");
            }
            Err(err @ MailwireError::Auth(_)) => {
                warn!(error = %err, "session rejected, will log in again");
                state.handle = None;
            }
            Err(err) => warn!(error = %err, kind = err.label(), "batch submission failed"),
        }
        drop(state);

        if self.debug {
            *self.last_exchange.lock() = Some(Exchange {
                request,
                response: response.clone(),
                completed_at: Utc::now(),
            });
        }

        response
    }
}
