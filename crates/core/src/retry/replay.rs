//! Replay pass over the retry store
//!
//! Applies the retry limit on top of the store primitives. Units that reached
//! the limit stay in the store untouched so an operator can inspect them.

use std::sync::Arc;

use futures::StreamExt;
use mailwire_domain::{MailwireError, Result, RetryHandle};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::ports::{AttemptOutcome, RetryStore};
use crate::transport::TransportSession;

/// Counters for one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Handles listed at the start of the pass
    pub scanned: usize,
    /// Units delivered and removed
    pub delivered: usize,
    /// Transport failed again; stored with one more attempt
    pub deferred: usize,
    /// At or above the retry limit; left in place
    pub exhausted: usize,
    /// Listing, loading or storing failed
    pub failed: usize,
    /// Per-item remote errors inside delivered batches
    pub item_errors: usize,
}

impl ReplaySummary {
    /// Units still in the store after this pass.
    pub fn remaining(&self) -> usize {
        self.deferred + self.exhausted + self.failed
    }
}

/// Replays stored units through a session, honoring a retry limit.
pub struct Replayer {
    store: Arc<dyn RetryStore>,
    session: Arc<TransportSession>,
    retry_limit: u32,
}

impl Replayer {
    pub fn new(store: Arc<dyn RetryStore>, session: Arc<TransportSession>, retry_limit: u32) -> Self {
        Self { store, session, retry_limit }
    }

    /// Attempt count at which a unit is left alone.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Run one pass over the units stored when the pass starts.
    #[instrument(skip(self), fields(retry_limit = self.retry_limit))]
    pub async fn run(&self) -> Result<ReplaySummary> {
        let listed: Vec<Result<RetryHandle>> = self.store.list_pending().collect().await;
        let mut summary = ReplaySummary::default();

        for handle in listed {
            let handle = match handle {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(error = %err, "failed to list stored unit");
                    summary.failed += 1;
                    continue;
                }
            };
            summary.scanned += 1;
            self.replay_one(&handle, &mut summary).await;
        }

        info!(
            scanned = summary.scanned,
            delivered = summary.delivered,
            deferred = summary.deferred,
            exhausted = summary.exhausted,
            failed = summary.failed,
            "replay pass finished"
        );
        Ok(summary)
    }

    async fn replay_one(&self, handle: &RetryHandle, summary: &mut ReplaySummary) {
        let unit = match self.store.load(handle).await {
            Ok(unit) => unit,
            // Another replayer got there first
            Err(MailwireError::NotFound(_)) => {
                summary.scanned -= 1;
                return;
            }
            Err(err) => {
                warn!(handle = %handle, error = %err, "failed to load stored unit");
                summary.failed += 1;
                return;
            }
        };

        if unit.attempt_count >= self.retry_limit {
            warn!(
                handle = %handle,
                entity = %unit.entity,
                attempts = unit.attempt_count,
                "retry limit reached, leaving unit in store"
            );
            summary.exhausted += 1;
            return;
        }

        match self.store.attempt(handle, &self.session).await {
            Ok(AttemptOutcome::Delivered { result, .. }) => {
                summary.delivered += 1;
                summary.item_errors += result.error_count();
                if result.has_errors() {
                    warn!(
                        handle = %handle,
                        errors = result.error_count(),
                        "replayed batch reported item errors"
                    );
                }
            }
            Ok(AttemptOutcome::Deferred { attempts, .. }) => {
                debug!(handle = %handle, attempts, "unit deferred");
                summary.deferred += 1;
            }
            Err(MailwireError::NotFound(_)) => summary.scanned -= 1,
            Err(err) => {
                warn!(handle = %handle, error = %err, "replay attempt failed");
                summary.failed += 1;
            }
        }
    }
}
