//! Test doubles for the transport and retry store ports
//!
//! Compiled for unit tests and behind the `test-utils` feature for
//! integration tests in this and downstream crates.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use mailwire_domain::{
    BatchItem, BatchResult, MailwireError, PendingWriteUnit, Result, RetryHandle,
};
use parking_lot::Mutex;
use serde_json::json;

use crate::retry::RetryStore;
use crate::transport::{BatchRequest, BatchTransport, SessionHandle};

enum Fallback {
    /// Succeed every item, echoing the payload back (adds get an `id`)
    Echo,
    Fail(MailwireError),
}

/// Scriptable [`BatchTransport`] that records every call.
///
/// Scripted responses are consumed first; after that the fallback applies.
pub struct StubTransport {
    script: Mutex<VecDeque<Result<BatchResult>>>,
    fallback: Mutex<Fallback>,
    requests: Mutex<Vec<BatchRequest>>,
    logins: Mutex<Vec<String>>,
    login_error: Mutex<Option<MailwireError>>,
    next_id: AtomicU64,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Fallback::Echo),
            requests: Mutex::new(Vec::new()),
            logins: Mutex::new(Vec::new()),
            login_error: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Transport whose every submission fails with `err`.
    pub fn failing(err: MailwireError) -> Self {
        let stub = Self::new();
        stub.always_fail(err);
        stub
    }

    pub fn push_result(&self, items: Vec<BatchItem>) {
        self.script.lock().push_back(Ok(BatchResult::from_items(items)));
    }

    pub fn push_error(&self, err: MailwireError) {
        self.script.lock().push_back(Err(err));
    }

    pub fn always_fail(&self, err: MailwireError) {
        *self.fallback.lock() = Fallback::Fail(err);
    }

    pub fn echo(&self) {
        *self.fallback.lock() = Fallback::Echo;
    }

    pub fn fail_login(&self, err: MailwireError) {
        *self.login_error.lock() = Some(err);
    }

    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<BatchRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn logins(&self) -> Vec<String> {
        self.logins.lock().clone()
    }

    pub fn login_count(&self) -> usize {
        self.logins.lock().len()
    }

    fn echo_response(&self, request: &BatchRequest) -> BatchResult {
        if request.operation == mailwire_domain::Operation::Read {
            return BatchResult::default();
        }
        let items = request
            .items
            .iter()
            .map(|item| {
                let mut fields = item.clone();
                if request.operation.creates() && !fields.contains_key("id") {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    fields.insert("id".to_string(), json!(id.to_string()));
                }
                BatchItem::Success { fields, is_new: request.operation.creates() }
            })
            .collect();
        BatchResult::from_items(items)
    }
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchTransport for StubTransport {
    async fn login(&self, token: &str) -> Result<SessionHandle> {
        if let Some(err) = self.login_error.lock().clone() {
            return Err(err);
        }
        let mut logins = self.logins.lock();
        logins.push(token.to_string());
        Ok(SessionHandle::new(format!("session-{}", logins.len())))
    }

    async fn submit_batch(
        &self,
        _session: &SessionHandle,
        request: &BatchRequest,
    ) -> Result<BatchResult> {
        self.requests.lock().push(request.clone());
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        let failure = match &*self.fallback.lock() {
            Fallback::Echo => None,
            Fallback::Fail(err) => Some(err.clone()),
        };
        match failure {
            Some(err) => Err(err),
            None => Ok(self.echo_response(request)),
        }
    }
}

/// In-memory [`RetryStore`].
pub struct MemoryRetryStore {
    units: Mutex<BTreeMap<RetryHandle, PendingWriteUnit>>,
    sequence: AtomicU64,
    unavailable: AtomicBool,
    remove_fails: AtomicBool,
}

impl MemoryRetryStore {
    pub fn new() -> Self {
        Self {
            units: Mutex::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            remove_fails: AtomicBool::new(false),
        }
    }

    /// Make `store` fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `remove` fail and keep the unit.
    pub fn set_remove_fails(&self, fails: bool) {
        self.remove_fails.store(fails, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }

    pub fn units(&self) -> Vec<PendingWriteUnit> {
        self.units.lock().values().cloned().collect()
    }
}

impl Default for MemoryRetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetryStore for MemoryRetryStore {
    async fn store(&self, unit: &PendingWriteUnit) -> Result<RetryHandle> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MailwireError::StoreUnavailable("memory store disabled".to_string()));
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let handle = RetryHandle::new(format!(
            "{}_{sequence:06}_{}",
            unit.entity.to_lowercase(),
            unit.attempt_count
        ));
        self.units.lock().insert(handle.clone(), unit.clone());
        Ok(handle)
    }

    async fn load(&self, handle: &RetryHandle) -> Result<PendingWriteUnit> {
        self.units
            .lock()
            .get(handle)
            .cloned()
            .ok_or_else(|| MailwireError::NotFound(format!("stored unit {handle}")))
    }

    fn list_pending(&self) -> BoxStream<'_, Result<RetryHandle>> {
        let handles: Vec<Result<RetryHandle>> = self.units.lock().keys().cloned().map(Ok).collect();
        stream::iter(handles).boxed()
    }

    async fn remove(&self, handle: &RetryHandle) -> Result<()> {
        if self.remove_fails.load(Ordering::SeqCst) {
            return Err(MailwireError::StoreUnavailable("memory store is read-only".to_string()));
        }
        self.units.lock().remove(handle);
        Ok(())
    }
}
