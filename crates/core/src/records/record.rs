//! Record lifecycle
//!
//! A record mirrors one remote object. It tracks which fields changed since
//! the remote side last confirmed them and moves between these states:
//!
//! - new: never persisted, `clean_fields` empty, the next save adds
//! - clean / dirty: persisted, with or without pending local changes
//! - error: the remote side rejected an operation; the record is poisoned
//!   (read-only, not loaded) and refuses every further change
//! - deleted: the remote object is gone; fields cleared, read-only
//!
//! Remote per-item failures poison the record. Transport failures leave it
//! untouched so the caller can retry.

use std::collections::BTreeSet;
use std::sync::Arc;

use mailwire_domain::constants::FIRST_PAGE;
use mailwire_domain::{
    key_string, present, BatchItem, BatchResult, CorrelationKey, EntityDescriptor, FieldMap,
    MailwireError, Mutability, Operation, Result,
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::client::Client;
use crate::transport::BatchRequest;
use crate::write_cache::{FlushReport, ItemOutcome};

/// One addressable remote object.
pub struct Record {
    descriptor: Arc<EntityDescriptor>,
    client: Client,
    fields: FieldMap,
    clean_fields: FieldMap,
    dirty: BTreeSet<String>,
    is_new: bool,
    is_error: bool,
    is_loaded: bool,
    read_only: bool,
    error_code: Option<i64>,
    error_message: Option<String>,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.descriptor.name())
            .field("fields", &self.fields)
            .field("dirty", &self.dirty)
            .field("is_new", &self.is_new)
            .field("is_error", &self.is_error)
            .field("is_loaded", &self.is_loaded)
            .field("read_only", &self.read_only)
            .field("error_code", &self.error_code)
            .finish_non_exhaustive()
    }
}

impl Record {
    /// A record built from caller data: every supplied field is dirty.
    pub(crate) fn new(client: Client, descriptor: Arc<EntityDescriptor>, data: FieldMap) -> Self {
        let mut record = Self::empty(client, descriptor);
        for (field, value) in data {
            let value = record.descriptor.normalize(&field, value);
            record.dirty.insert(field.clone());
            record.fields.insert(field, value);
        }
        record
    }

    /// A record built from data the remote side returned: starts clean.
    pub(crate) fn stored(client: Client, descriptor: Arc<EntityDescriptor>, data: FieldMap) -> Self {
        let mut record = Self::empty(client, descriptor);
        record.clean_fields = data.clone();
        record.fields = data;
        record.is_loaded = true;
        record
    }

    fn empty(client: Client, descriptor: Arc<EntityDescriptor>) -> Self {
        let read_only = descriptor.mutability() == Mutability::ReadOnly;
        Self {
            descriptor,
            client,
            fields: FieldMap::new(),
            clean_fields: FieldMap::new(),
            dirty: BTreeSet::new(),
            is_new: false,
            is_error: false,
            is_loaded: false,
            read_only,
            error_code: None,
            error_message: None,
        }
    }

    /// Remote entity type name.
    pub fn entity(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Current value of `field`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Current value of `field` when it is a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Snapshot last confirmed by the remote side; empty until first saved or read.
    pub fn clean_fields(&self) -> &FieldMap {
        &self.clean_fields
    }

    /// Fields changed since the last clean snapshot.
    pub fn dirty_fields(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// True when the last save created the remote object.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// True once a remote failure has poisoned the record.
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// True after a successful read or save.
    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Remote error code of the failure that poisoned the record.
    pub fn error_code(&self) -> Option<i64> {
        self.error_code
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Primary key as a string, when present.
    pub fn primary_key_value(&self) -> Option<String> {
        present(&self.fields, self.descriptor.primary_key()).and_then(key_string)
    }

    /// Set `field` and mark it dirty, normalizing the value when the entity asks for it.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.ensure_writable()?;
        let field = field.into();
        let value = self.descriptor.normalize(&field, value.into());
        self.dirty.insert(field.clone());
        self.fields.insert(field, value);
        Ok(())
    }

    /// Remove a field; it is no longer sent on the next save.
    pub fn unset(&mut self, field: &str) -> Result<Option<Value>> {
        self.ensure_writable()?;
        self.dirty.remove(field);
        Ok(self.fields.remove(field))
    }

    /// Set one entry of a contact's custom `fields` list.
    ///
    /// Entries are `{fieldId, content}` objects; an existing entry for the
    /// same field id is replaced. Empty content is ignored.
    pub fn set_custom_field(&mut self, field_id: &str, content: impl Into<Value>) -> Result<()> {
        self.ensure_writable()?;
        let content = content.into();
        if content.as_str() == Some("") {
            return Ok(());
        }
        let entry = serde_json::json!({ "fieldId": field_id, "content": content });

        let list = self.fields.entry("fields".to_string()).or_insert_with(|| Value::Array(Vec::new()));
        if !list.is_array() {
            *list = Value::Array(Vec::new());
        }
        if let Value::Array(entries) = list {
            match entries.iter_mut().find(|e| e.get("fieldId").and_then(Value::as_str) == Some(field_id)) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        self.dirty.insert("fields".to_string());
        Ok(())
    }

    /// Content of a custom field entry.
    pub fn custom_field(&self, field_id: &str) -> Option<&Value> {
        self.fields
            .get("fields")?
            .as_array()?
            .iter()
            .find(|e| e.get("fieldId").and_then(Value::as_str) == Some(field_id))?
            .get("content")
    }

    /// Load the record from the remote side using its lookup key.
    #[instrument(skip(self), fields(entity = %self.entity()))]
    pub async fn read(&mut self) -> Result<()> {
        if self.is_error {
            return Err(self.poisoned_error());
        }
        let method = self.descriptor.require_method(Operation::Read)?.to_string();
        let filter = self
            .descriptor
            .lookup_filter(&self.fields)
            .ok_or_else(|| MailwireError::lookup_key_missing(self.entity()))?;

        let request = BatchRequest::read(self.entity(), method, filter, FIRST_PAGE);
        let result = self.client.submit(request).await?;

        if let Some(err) = result.first_error() {
            self.poison(err.code, &err.message);
            return Err(MailwireError::remote(self.entity(), err.code, err.message));
        }
        match result.data(0) {
            Some(data) => {
                self.fields.extend(data.clone());
                self.mark_clean();
                self.is_loaded = true;
                debug!("record loaded");
            }
            None => debug!("read returned no rows"),
        }
        Ok(())
    }

    /// Save with the entity's default upsert policy and no forced refresh.
    pub async fn save(&mut self) -> Result<()> {
        self.save_with(self.descriptor.upsert_by_default(), false).await
    }

    /// Save immediately.
    ///
    /// A never-persisted record is added (or upserted when `upsert` is set
    /// and supported). A persisted one sends only its dirty fields plus the
    /// primary key, and nothing at all when nothing changed.
    #[instrument(skip(self), fields(entity = %self.entity()))]
    pub async fn save_with(&mut self, upsert: bool, refresh: bool) -> Result<()> {
        self.ensure_writable()?;
        if self.descriptor.mutability() == Mutability::ReadOnly {
            return Err(MailwireError::immutable(self.entity(), "entity cannot be saved"));
        }
        let Some(operation) = self.save_operation(upsert)? else {
            debug!("nothing to save");
            return Ok(());
        };

        let method = self.descriptor.require_method(operation)?.to_string();
        let payload = self.payload();
        let request = BatchRequest::write(self.entity(), operation, method, vec![payload]);
        let result = self.client.submit(request).await?;

        match first_item(self.entity(), result)? {
            BatchItem::Success { fields, is_new } => self.mark_saved(fields, is_new),
            BatchItem::Failure { code, message } => {
                if self.descriptor.duplicate_code() == Some(code) {
                    debug!(code, "record already exists, refreshing instead");
                    return self.read().await;
                }
                self.poison(code, &message);
                return Err(MailwireError::remote(self.entity(), code, message));
            }
        }

        if refresh || self.client.config().refresh_on_save {
            self.read().await?;
        }
        Ok(())
    }

    /// Delete the remote object immediately.
    #[instrument(skip(self), fields(entity = %self.entity()))]
    pub async fn delete(&mut self) -> Result<()> {
        let method = self.descriptor.require_method(Operation::Delete)?.to_string();
        self.ensure_writable()?;

        if self.primary_key_value().is_none() {
            self.read().await?;
        }
        let item = self.delete_payload()?;

        let request = BatchRequest::write(self.entity(), Operation::Delete, method, vec![item]);
        let result = self.client.submit(request).await?;

        match first_item(self.entity(), result)? {
            BatchItem::Success { .. } => {
                self.mark_deleted();
                Ok(())
            }
            BatchItem::Failure { code, message } => {
                self.poison(code, &message);
                Err(MailwireError::remote(self.entity(), code, message))
            }
        }
    }

    /// Buffer a save in the client's write cache.
    ///
    /// Returns the key under which the flush report carries this record's
    /// outcome; pass that outcome to [`Record::apply_outcome`].
    pub fn persist(&self) -> Result<CorrelationKey> {
        self.ensure_writable()?;
        let operation = match self.descriptor.mutability() {
            Mutability::ReadOnly => {
                return Err(MailwireError::immutable(self.entity(), "entity cannot be saved"));
            }
            Mutability::AppendOnly => {
                if !self.clean_fields.is_empty() {
                    return Err(MailwireError::immutable(
                        self.entity(),
                        "append-only records cannot be updated",
                    ));
                }
                Operation::Add
            }
            Mutability::Mutable if self.descriptor.supports(Operation::AddOrUpdate) => {
                Operation::AddOrUpdate
            }
            Mutability::Mutable if self.clean_fields.is_empty() => Operation::Add,
            Mutability::Mutable => Operation::Update,
        };
        let method = self.descriptor.require_method(operation)?;

        let key = self
            .primary_key_value()
            .or_else(|| {
                self.descriptor
                    .persist_key()
                    .and_then(|field| present(&self.fields, field))
                    .and_then(key_string)
            })
            .map(CorrelationKey::Key);

        self.client.write_cache().enqueue(
            self.entity(),
            operation,
            method,
            self.payload(),
            key,
        )
    }

    /// Buffer a delete in the client's write cache.
    pub fn persist_delete(&self) -> Result<CorrelationKey> {
        let method = self.descriptor.require_method(Operation::Delete)?;
        self.ensure_writable()?;
        let item = self.delete_payload()?;
        let key = self.primary_key_value().map(CorrelationKey::Key);
        self.client.write_cache().enqueue(self.entity(), Operation::Delete, method, item, key)
    }

    /// Reconcile this record with the outcome of a flushed item.
    pub fn apply_outcome(&mut self, operation: Operation, outcome: &ItemOutcome) -> Result<()> {
        match outcome {
            ItemOutcome::Applied { .. } if operation == Operation::Delete => {
                self.mark_deleted();
                Ok(())
            }
            ItemOutcome::Applied { fields, is_new } => {
                self.mark_saved(fields.clone(), *is_new);
                Ok(())
            }
            ItemOutcome::Rejected { code, message } => {
                self.poison(*code, message);
                Err(MailwireError::remote(self.entity(), *code, message.clone()))
            }
        }
    }

    /// Look up `key` in a flush report and apply it.
    ///
    /// Returns `Ok(false)` when the report does not mention the key.
    pub fn apply_report(&mut self, report: &FlushReport, key: &CorrelationKey) -> Result<bool> {
        if !report.entity.eq_ignore_ascii_case(self.entity()) {
            return Ok(false);
        }
        match report.outcome_for(key) {
            Some(outcome) => self.apply_outcome(report.operation, outcome).map(|()| true),
            None => Ok(false),
        }
    }

    fn save_operation(&self, upsert: bool) -> Result<Option<Operation>> {
        let can_upsert = self.descriptor.supports(Operation::AddOrUpdate);

        if self.clean_fields.is_empty() {
            let add_only = !self.descriptor.supports(Operation::Add);
            if can_upsert && (upsert || add_only) {
                return Ok(Some(Operation::AddOrUpdate));
            }
            return Ok(Some(Operation::Add));
        }

        if self.descriptor.mutability() == Mutability::AppendOnly {
            return Err(MailwireError::immutable(
                self.entity(),
                "append-only records cannot be updated",
            ));
        }
        if !self.is_dirty() {
            return Ok(None);
        }
        if upsert && can_upsert {
            return Ok(Some(Operation::AddOrUpdate));
        }
        Ok(Some(Operation::Update))
    }

    /// Dirty fields plus the primary key when known.
    fn payload(&self) -> FieldMap {
        let primary_key = self.descriptor.primary_key();
        let mut payload: FieldMap = self
            .dirty
            .iter()
            .filter_map(|field| self.fields.get(field).map(|v| (field.clone(), v.clone())))
            .collect();
        if let Some(value) = present(&self.fields, primary_key) {
            payload.insert(primary_key.to_string(), value.clone());
        }
        payload
    }

    fn delete_payload(&self) -> Result<FieldMap> {
        let primary_key = self.descriptor.primary_key();
        let value = present(&self.fields, primary_key)
            .ok_or_else(|| MailwireError::lookup_key_missing(self.entity()))?;
        Ok(FieldMap::from([(primary_key.to_string(), value.clone())]))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_error {
            return Err(self.poisoned_error());
        }
        if self.read_only {
            return Err(MailwireError::immutable(self.entity(), "record is read-only"));
        }
        Ok(())
    }

    fn poisoned_error(&self) -> MailwireError {
        MailwireError::immutable(
            self.entity(),
            format!(
                "record is in error state ({}: {})",
                self.error_code.unwrap_or_default(),
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
        )
    }

    fn mark_clean(&mut self) {
        self.clean_fields = self.fields.clone();
        self.dirty.clear();
    }

    fn mark_saved(&mut self, returned: FieldMap, is_new: bool) {
        self.fields.extend(returned);
        self.mark_clean();
        self.is_new = is_new;
        self.is_loaded = true;
        debug!(entity = self.entity(), is_new, "record saved");
    }

    fn mark_deleted(&mut self) {
        self.fields.clear();
        self.clean_fields.clear();
        self.dirty.clear();
        self.read_only = true;
        self.is_loaded = false;
        debug!(entity = self.entity(), "record deleted");
    }

    fn poison(&mut self, code: i64, message: &str) {
        warn!(entity = self.entity(), code, message, "remote rejected record");
        self.is_error = true;
        self.read_only = true;
        self.is_loaded = false;
        self.error_code = Some(code);
        self.error_message = Some(message.to_string());
    }
}

/// First result item of a single-item batch.
fn first_item(entity: &str, result: BatchResult) -> Result<BatchItem> {
    result.into_items().into_iter().next().ok_or_else(|| {
        MailwireError::Transport(format!("{entity} batch response contained no result items"))
    })
}
