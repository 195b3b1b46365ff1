//! Write cache: buffered mutations flushed as one batch per (entity, verb)
//!
//! Items keep their enqueue order. Result item `i` answers payload item `i`,
//! so correlation back to callers is purely positional. A transport failure
//! during flush hands the whole unit to the retry store and is reported as a
//! deferred outcome, not an error.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use mailwire_domain::constants::MISSING_RESULT_CODE;
use mailwire_domain::{
    BatchItem, BatchResult, CorrelationKey, FieldMap, MailwireError, Operation,
    PendingWriteUnit, Result, RetryHandle,
};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::retry::RetryStore;
use crate::transport::{BatchRequest, TransportSession};

type UnitKey = (String, Operation);

/// What happened to one enqueued item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// The remote side accepted the item
    Applied { fields: FieldMap, is_new: bool },
    /// The remote side refused the item
    Rejected { code: i64, message: String },
}

impl ItemOutcome {
    /// True for [`ItemOutcome::Applied`].
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// An item outcome paired with the key it was enqueued under.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedOutcome {
    /// Key returned by `enqueue`
    pub key: CorrelationKey,
    pub outcome: ItemOutcome,
}

/// Per-item results of a delivered unit, in enqueue order.
#[derive(Debug, Clone)]
pub struct FlushReport {
    /// Entity the unit was flushed for
    pub entity: String,
    /// Batch operation of the unit
    pub operation: Operation,
    /// One entry per payload item, in enqueue order
    pub outcomes: Vec<CorrelatedOutcome>,
    /// Raw batch response
    pub result: BatchResult,
}

impl FlushReport {
    /// Outcome recorded for `key`, if it was part of this unit.
    pub fn outcome_for(&self, key: &CorrelationKey) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|entry| &entry.key == key).map(|entry| &entry.outcome)
    }

    /// Items the remote side rejected.
    pub fn failures(&self) -> impl Iterator<Item = &CorrelatedOutcome> + '_ {
        self.outcomes.iter().filter(|entry| !entry.outcome.is_applied())
    }

    pub fn has_errors(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Where a deferred unit went.
#[derive(Debug, Clone)]
pub enum Deferral {
    /// Persisted in the retry store
    Stored(RetryHandle),
    /// No retry store configured; the caller owns the unit now
    Returned(PendingWriteUnit),
}

/// Result of flushing one (entity, verb) unit.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    /// Nothing was pending
    Empty,
    /// The batch went through; see the report for per-item results
    Delivered(FlushReport),
    /// The transport failed; the unit was handed off with one more attempt
    Deferred {
        /// Entity of the deferred unit
        entity: String,
        operation: Operation,
        /// Attempt count recorded on the handed-off unit
        attempts: u32,
        /// Transport error that caused the deferral
        reason: MailwireError,
        deferral: Deferral,
    },
}

impl FlushOutcome {
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    /// Report of a delivered unit.
    pub const fn report(&self) -> Option<&FlushReport> {
        match self {
            Self::Delivered(report) => Some(report),
            _ => None,
        }
    }
}

/// Pending mutations for one client session.
pub struct WriteCache {
    session: Arc<TransportSession>,
    retry_store: Option<Arc<dyn RetryStore>>,
    pending: Mutex<BTreeMap<UnitKey, PendingWriteUnit>>,
    next_index: AtomicUsize,
}

impl WriteCache {
    /// Empty cache submitting through `session`.
    pub fn new(session: Arc<TransportSession>, retry_store: Option<Arc<dyn RetryStore>>) -> Self {
        Self {
            session,
            retry_store,
            pending: Mutex::new(BTreeMap::new()),
            next_index: AtomicUsize::new(0),
        }
    }

    /// Append an item to the unit for (entity, operation).
    ///
    /// Without a key the item gets a synthetic index that is unique within
    /// this cache.
    pub fn enqueue(
        &self,
        entity: &str,
        operation: Operation,
        method: &str,
        item: FieldMap,
        key: Option<CorrelationKey>,
    ) -> Result<CorrelationKey> {
        if !operation.is_write() {
            return Err(MailwireError::InvalidInput(format!(
                "cannot buffer {operation} for {entity}"
            )));
        }
        let key = key.unwrap_or_else(|| {
            CorrelationKey::Index(self.next_index.fetch_add(1, AtomicOrdering::Relaxed))
        });

        let mut pending = self.pending.lock();
        let unit = pending
            .entry((entity.to_string(), operation))
            .or_insert_with(|| PendingWriteUnit::new(entity, operation, method));
        let key = unit.push(item, Some(key));
        debug!(entity, operation = %operation, key = %key, queued = unit.len(), "item enqueued");
        Ok(key)
    }

    /// Number of items waiting for (entity, operation).
    pub fn pending_count(&self, entity: &str, operation: Operation) -> usize {
        self.pending
            .lock()
            .get(&(entity.to_string(), operation))
            .map_or(0, PendingWriteUnit::len)
    }

    /// True when nothing is waiting to be flushed.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Snapshot of everything pending, in (entity, operation) order.
    pub fn pending_units(&self) -> Vec<PendingWriteUnit> {
        self.pending.lock().values().cloned().collect()
    }

    /// Drop a pending unit without submitting it.
    pub fn discard(&self, entity: &str, operation: Operation) -> Option<PendingWriteUnit> {
        self.pending.lock().remove(&(entity.to_string(), operation))
    }

    /// Submit the unit for (entity, operation) as one batch.
    #[instrument(skip(self), fields(operation = %operation))]
    pub async fn flush(&self, entity: &str, operation: Operation) -> Result<FlushOutcome> {
        let unit = self.pending.lock().remove(&(entity.to_string(), operation));
        match unit {
            Some(unit) if !unit.is_empty() => self.submit_unit(unit).await,
            _ => Ok(FlushOutcome::Empty),
        }
    }

    /// Flush every pending unit in (entity, operation) order.
    ///
    /// Stops at the first error; units not yet flushed stay pending.
    pub async fn flush_all(&self) -> Result<Vec<FlushOutcome>> {
        let keys: Vec<UnitKey> = self.pending.lock().keys().cloned().collect();
        let mut outcomes = Vec::with_capacity(keys.len());
        for (entity, operation) in keys {
            outcomes.push(self.flush(&entity, operation).await?);
        }
        Ok(outcomes)
    }

    async fn submit_unit(&self, unit: PendingWriteUnit) -> Result<FlushOutcome> {
        match self.session.submit(BatchRequest::from_unit(&unit)).await {
            Ok(result) => {
                let report = correlate(&unit, result);
                let failures = report.failures().count();
                if failures > 0 {
                    warn!(
                        entity = %unit.entity,
                        operation = %unit.operation,
                        failures,
                        "flushed batch reported item errors"
                    );
                }
                info!(entity = %unit.entity, items = unit.len(), failures, "unit delivered");
                Ok(FlushOutcome::Delivered(report))
            }
            Err(reason) if reason.is_transport() => self.defer(unit, reason).await,
            Err(err) => {
                self.restore(unit);
                Err(err)
            }
        }
    }

    async fn defer(&self, unit: PendingWriteUnit, reason: MailwireError) -> Result<FlushOutcome> {
        let next = unit.next_attempt();
        let deferral = match &self.retry_store {
            Some(store) => match store.store(&next).await {
                Ok(handle) => Deferral::Stored(handle),
                Err(err) => {
                    warn!(entity = %unit.entity, error = %err, "retry store rejected unit");
                    self.restore(unit);
                    return Err(err);
                }
            },
            None => Deferral::Returned(next.clone()),
        };

        warn!(
            entity = %next.entity,
            operation = %next.operation,
            attempts = next.attempt_count,
            error = %reason,
            "flush deferred"
        );
        Ok(FlushOutcome::Deferred {
            entity: next.entity,
            operation: next.operation,
            attempts: next.attempt_count,
            reason,
            deferral,
        })
    }

    /// Put a unit back in front of anything enqueued since it was taken.
    fn restore(&self, mut unit: PendingWriteUnit) {
        let mut pending = self.pending.lock();
        let key = (unit.entity.clone(), unit.operation);
        if let Some(newer) = pending.remove(&key) {
            unit.payload.extend(newer.payload);
            unit.correlation_keys.extend(newer.correlation_keys);
        }
        pending.insert(key, unit);
    }
}

fn correlate(unit: &PendingWriteUnit, result: BatchResult) -> FlushReport {
    if result.count() != unit.len() {
        warn!(
            entity = %unit.entity,
            expected = unit.len(),
            received = result.count(),
            "batch result count does not match payload"
        );
    }

    let outcomes = unit
        .correlation_keys
        .iter()
        .enumerate()
        .map(|(index, key)| {
            let outcome = match result.item(index) {
                Some(BatchItem::Success { fields, is_new }) => {
                    ItemOutcome::Applied { fields: fields.clone(), is_new: *is_new }
                }
                Some(BatchItem::Failure { code, message }) => {
                    ItemOutcome::Rejected { code: *code, message: message.clone() }
                }
                None => ItemOutcome::Rejected {
                    code: MISSING_RESULT_CODE,
                    message: "no result item returned for this entry".to_string(),
                },
            };
            CorrelatedOutcome { key: key.clone(), outcome }
        })
        .collect();

    FlushReport { entity: unit.entity.clone(), operation: unit.operation, outcomes, result }
}

#[cfg(test)]
mod tests {
    use mailwire_domain::field_map;
    use serde_json::json;

    use super::*;
    use crate::testing::{MemoryRetryStore, StubTransport};

    fn cache_with(
        transport: Arc<StubTransport>,
        store: Option<Arc<MemoryRetryStore>>,
    ) -> WriteCache {
        let session = Arc::new(TransportSession::new(transport, Some("token".to_string()), false));
        WriteCache::new(session, store.map(|s| s as Arc<dyn RetryStore>))
    }

    fn email(address: &str) -> FieldMap {
        field_map([("email", json!(address))])
    }

    #[tokio::test]
    async fn test_enqueue_does_not_call_transport() {
        let transport = Arc::new(StubTransport::new());
        let cache = cache_with(transport.clone(), None);

        cache.enqueue("Contact", Operation::Add, "addContacts", email("a@b.com"), None).unwrap();
        cache.enqueue("Contact", Operation::Add, "addContacts", email("c@d.com"), None).unwrap();

        assert_eq!(cache.pending_count("Contact", Operation::Add), 2);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_read_cannot_be_buffered() {
        let cache = cache_with(Arc::new(StubTransport::new()), None);
        let err = cache
            .enqueue("Contact", Operation::Read, "readContacts", FieldMap::new(), None)
            .unwrap_err();
        assert!(matches!(err, MailwireError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_synthetic_indexes_are_unique_across_units() {
        let cache = cache_with(Arc::new(StubTransport::new()), None);
        let a = cache.enqueue("Conversion", Operation::Add, "addConversion", FieldMap::new(), None);
        let b = cache.enqueue("Order", Operation::AddOrUpdate, "addOrUpdateOrders", FieldMap::new(), None);
        assert_ne!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_flush_empty_unit() {
        let transport = Arc::new(StubTransport::new());
        let cache = cache_with(transport.clone(), None);
        let outcome = cache.flush("Contact", Operation::Add).await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Empty));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_submits_one_batch_in_enqueue_order() {
        let transport = Arc::new(StubTransport::new());
        let cache = cache_with(transport.clone(), None);
        for address in ["1@x.com", "2@x.com", "3@x.com"] {
            cache
                .enqueue(
                    "Contact",
                    Operation::AddOrUpdate,
                    "addOrUpdateContacts",
                    email(address),
                    Some(CorrelationKey::Key(address.to_string())),
                )
                .unwrap();
        }

        cache.flush("Contact", Operation::AddOrUpdate).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let sent: Vec<_> = requests[0].items.iter().map(|item| item["email"].clone()).collect();
        assert_eq!(sent, vec![json!("1@x.com"), json!("2@x.com"), json!("3@x.com")]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_short_response_rejects_unmatched_keys() {
        let transport = Arc::new(StubTransport::new());
        transport.push_result(vec![BatchItem::success(field_map([("id", json!("1"))]))]);
        let cache = cache_with(transport, None);
        let first = cache.enqueue("Order", Operation::AddOrUpdate, "addOrUpdateOrders", FieldMap::new(), None).unwrap();
        let second = cache.enqueue("Order", Operation::AddOrUpdate, "addOrUpdateOrders", FieldMap::new(), None).unwrap();

        let outcome = cache.flush("Order", Operation::AddOrUpdate).await.unwrap();
        let report = outcome.report().unwrap();
        assert!(report.outcome_for(&first).unwrap().is_applied());
        assert_eq!(
            report.outcome_for(&second),
            Some(&ItemOutcome::Rejected {
                code: MISSING_RESULT_CODE,
                message: "no result item returned for this entry".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_transport_failure_without_store_returns_unit() {
        let transport = Arc::new(StubTransport::new());
        transport.push_error(MailwireError::Transport("connection reset".to_string()));
        let cache = cache_with(transport, None);
        cache.enqueue("Contact", Operation::Add, "addContacts", email("a@b.com"), None).unwrap();

        let outcome = cache.flush("Contact", Operation::Add).await.unwrap();
        match outcome {
            FlushOutcome::Deferred { attempts, deferral: Deferral::Returned(unit), .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(unit.attempt_count, 1);
                assert_eq!(unit.payload, vec![email("a@b.com")]);
            }
            other => panic!("expected returned unit, got {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_keeps_unit_pending() {
        let transport = Arc::new(StubTransport::new());
        transport.push_error(MailwireError::Timeout(std::time::Duration::from_secs(30)));
        let store = Arc::new(MemoryRetryStore::new());
        store.set_unavailable(true);
        let cache = cache_with(transport, Some(store));
        cache.enqueue("Contact", Operation::Add, "addContacts", email("a@b.com"), None).unwrap();
        cache.enqueue("Contact", Operation::Add, "addContacts", email("b@b.com"), None).unwrap();

        let err = cache.flush("Contact", Operation::Add).await.unwrap_err();
        assert!(matches!(err, MailwireError::StoreUnavailable(_)));
        assert_eq!(cache.pending_count("Contact", Operation::Add), 2);
        assert_eq!(cache.pending_units()[0].attempt_count, 0);
    }

    #[tokio::test]
    async fn test_flush_all_walks_every_unit() {
        let transport = Arc::new(StubTransport::new());
        let cache = cache_with(transport.clone(), None);
        cache.enqueue("Contact", Operation::AddOrUpdate, "addOrUpdateContacts", email("a@b.com"), None).unwrap();
        cache.enqueue("Contact", Operation::Delete, "deleteContacts", field_map([("id", json!("9"))]), None).unwrap();

        let outcomes = cache.flush_all().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(transport.call_count(), 2);
        // Delete sorts before AddOrUpdate in verb order
        assert_eq!(transport.requests()[0].operation, Operation::Delete);
    }
}
