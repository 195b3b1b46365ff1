//! Port interface for the remote batch API

use std::fmt;

use async_trait::async_trait;
use mailwire_domain::{BatchResult, FieldMap, Operation, PendingWriteUnit, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session identifier returned by a successful login.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Session ids are credentials; keep them out of logs.
impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHandle(..)")
    }
}

/// One batch call: a remote method applied to an ordered list of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Unique id used to correlate log events
    pub request_id: Uuid,
    pub entity: String,
    pub operation: Operation,
    /// Remote method name, e.g. `addContacts`
    pub method: String,
    /// Write payload, or a single filter for reads
    pub items: Vec<FieldMap>,
    /// Page for reads; `None` for writes
    pub page_number: Option<u32>,
}

impl BatchRequest {
    /// Write batch carrying `items`.
    pub fn write(
        entity: impl Into<String>,
        operation: Operation,
        method: impl Into<String>,
        items: Vec<FieldMap>,
    ) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            entity: entity.into(),
            operation,
            method: method.into(),
            items,
            page_number: None,
        }
    }

    /// Single-filter read of one page.
    pub fn read(
        entity: impl Into<String>,
        method: impl Into<String>,
        filter: FieldMap,
        page_number: u32,
    ) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            entity: entity.into(),
            operation: Operation::Read,
            method: method.into(),
            items: vec![filter],
            page_number: Some(page_number),
        }
    }

    /// Request that resubmits a pending unit unchanged.
    pub fn from_unit(unit: &PendingWriteUnit) -> Self {
        Self::write(unit.entity.clone(), unit.operation, unit.method.clone(), unit.payload.clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Wire transport for the remote API (SOAP encoding lives behind this).
///
/// Implementations report connection, protocol and timeout failures as
/// `Transport`/`Timeout` errors and credential problems as `Auth`.
/// Per-item remote errors belong in the returned [`BatchResult`].
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Exchange an API token for a session
    async fn login(&self, token: &str) -> Result<SessionHandle>;

    /// Submit one batch under an established session
    async fn submit_batch(
        &self,
        session: &SessionHandle,
        request: &BatchRequest,
    ) -> Result<BatchResult>;
}
