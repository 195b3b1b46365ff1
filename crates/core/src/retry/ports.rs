//! Port interface for durable retry storage

use async_trait::async_trait;
use futures::stream::BoxStream;
use mailwire_domain::{BatchResult, MailwireError, PendingWriteUnit, Result, RetryHandle};
use tracing::{debug, instrument, warn};

use crate::transport::{BatchRequest, TransportSession};

/// Result of replaying one stored unit.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The batch went through; the stored unit is gone.
    Delivered { unit: PendingWriteUnit, result: BatchResult },
    /// The transport failed again; the unit was stored under `handle`.
    Deferred { handle: RetryHandle, attempts: u32, reason: MailwireError },
}

/// Durable store for units that failed at the transport level.
///
/// The store only provides primitives. How often and how many times to
/// replay is decided by the caller.
#[async_trait]
pub trait RetryStore: Send + Sync {
    /// Persist a unit, returning its handle
    async fn store(&self, unit: &PendingWriteUnit) -> Result<RetryHandle>;

    /// Load a stored unit (`NotFound` if it is gone)
    async fn load(&self, handle: &RetryHandle) -> Result<PendingWriteUnit>;

    /// Handles currently stored. Each call re-scans the store.
    fn list_pending(&self) -> BoxStream<'_, Result<RetryHandle>>;

    /// Delete a stored unit; succeeds when it is already absent
    async fn remove(&self, handle: &RetryHandle) -> Result<()>;

    /// Resubmit a stored unit through `session`.
    ///
    /// Success removes the unit. A transport failure stores it again with
    /// one more attempt recorded and removes the old copy.
    ///
    /// A failed removal is logged and does not undo the outcome. The stale
    /// copy stays in the store and will be submitted again by a later pass,
    /// as will a unit whose attempt is cancelled between submit and remove.
    /// Delivery is at-least-once.
    #[instrument(skip(self, session), fields(handle = %handle))]
    async fn attempt(
        &self,
        handle: &RetryHandle,
        session: &TransportSession,
    ) -> Result<AttemptOutcome> {
        let unit = self.load(handle).await?;

        match session.submit(BatchRequest::from_unit(&unit)).await {
            Ok(result) => {
                if let Err(err) = self.remove(handle).await {
                    warn!(error = %err, "delivered unit could not be removed");
                }
                debug!(entity = %unit.entity, items = unit.len(), "stored unit delivered");
                Ok(AttemptOutcome::Delivered { unit, result })
            }
            Err(reason) if reason.is_transport() => {
                let next = unit.next_attempt();
                let new_handle = self.store(&next).await?;
                if &new_handle != handle {
                    if let Err(err) = self.remove(handle).await {
                        warn!(error = %err, "previous copy of deferred unit could not be removed");
                    }
                }
                warn!(
                    entity = %next.entity,
                    attempts = next.attempt_count,
                    error = %reason,
                    "stored unit deferred again"
                );
                Ok(AttemptOutcome::Deferred {
                    handle: new_handle,
                    attempts: next.attempt_count,
                    reason,
                })
            }
            Err(err) => Err(err),
        }
    }
}
