//! Client facade: one session, one write cache, one descriptor registry

use std::sync::Arc;

use mailwire_domain::constants::FIRST_PAGE;
use mailwire_domain::{
    BatchItem, BatchResult, ClientConfig, EntityDescriptor, FieldMap, MailwireError, Operation, Result,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::records::{EntityRegistry, Record};
use crate::retry::{ReplaySummary, Replayer, RetryStore};
use crate::transport::{BatchRequest, BatchTransport, TransportSession};
use crate::write_cache::{FlushOutcome, WriteCache};

struct ClientInner {
    config: ClientConfig,
    session: Arc<TransportSession>,
    registry: EntityRegistry,
    write_cache: WriteCache,
    retry_store: Option<Arc<dyn RetryStore>>,
}

/// Handle to the remote API. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Start building a client over `transport`.
    pub fn builder(transport: Arc<dyn BatchTransport>) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    /// Client from a validated config.
    ///
    /// # Errors
    /// `Config` when `config` fails validation.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn BatchTransport>,
        retry_store: Option<Arc<dyn RetryStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let session =
            Arc::new(TransportSession::new(transport, config.api_token.clone(), config.debug));
        let write_cache = WriteCache::new(Arc::clone(&session), retry_store.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                session,
                registry: EntityRegistry::new(),
                write_cache,
                retry_store,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Shared transport session.
    pub fn session(&self) -> &Arc<TransportSession> {
        &self.inner.session
    }

    /// Pending mutations buffered by `Record::persist`.
    pub fn write_cache(&self) -> &WriteCache {
        &self.inner.write_cache
    }

    /// Retry store used for deferred units, if configured.
    pub fn retry_store(&self) -> Option<&Arc<dyn RetryStore>> {
        self.inner.retry_store.as_ref()
    }

    /// Descriptor for `entity` (`NotFound` for unknown types).
    pub fn descriptor(&self, entity: &str) -> Result<Arc<EntityDescriptor>> {
        self.inner.registry.get(entity)
    }

    /// Add or replace an entity descriptor for this client.
    pub fn register(&self, descriptor: EntityDescriptor) -> Arc<EntityDescriptor> {
        self.inner.registry.register(descriptor)
    }

    /// Log in now instead of on the first submission.
    pub async fn login(&self, token: &str) -> Result<()> {
        self.inner.session.login(token).await
    }

    /// Drop the session; the next submission logs in again.
    pub async fn reset(&self) {
        self.inner.session.reset().await;
    }

    /// An empty, never-persisted record.
    pub fn record(&self, entity: &str) -> Result<Record> {
        self.record_with(entity, FieldMap::new())
    }

    /// A never-persisted record; every supplied field counts as changed.
    pub fn record_with(&self, entity: &str, data: FieldMap) -> Result<Record> {
        Ok(Record::new(self.clone(), self.descriptor(entity)?, data))
    }

    /// A record for data already confirmed by the remote side.
    pub fn stored_record(&self, entity: &str, data: FieldMap) -> Result<Record> {
        Ok(Record::stored(self.clone(), self.descriptor(entity)?, data))
    }

    /// Read one page of `entity` matching `filter`.
    #[instrument(skip(self, filter))]
    pub async fn read_all(&self, entity: &str, filter: FieldMap, page: u32) -> Result<BatchResult> {
        let descriptor = self.descriptor(entity)?;
        let method = descriptor.require_method(Operation::Read)?;
        let filter = descriptor.validate_filter(filter)?;
        let page = page.max(FIRST_PAGE);
        self.submit(BatchRequest::read(descriptor.name(), method, filter, page)).await
    }

    /// Like [`Client::read_all`], returning clean records.
    pub async fn records(&self, entity: &str, filter: FieldMap, page: u32) -> Result<Vec<Record>> {
        let descriptor = self.descriptor(entity)?;
        let result = self.read_all(entity, filter, page).await?;
        if let Some(err) = result.first_error() {
            return Err(MailwireError::remote(descriptor.name(), err.code, err.message));
        }
        Ok(result
            .into_items()
            .into_iter()
            .filter_map(|item| match item {
                BatchItem::Success { fields, .. } => {
                    Some(Record::stored(self.clone(), Arc::clone(&descriptor), fields))
                }
                BatchItem::Failure { .. } => None,
            })
            .collect())
    }

    /// The API token record for the token this client logs in with.
    pub async fn token_info(&self) -> Result<Record> {
        let token = self
            .inner
            .session
            .token()
            .await
            .ok_or_else(|| MailwireError::Config("no API token configured".to_string()))?;
        let mut record =
            self.record_with("ApiToken", FieldMap::from([("id".to_string(), Value::String(token))]))?;
        record.read().await?;
        Ok(record)
    }

    /// Flush the pending unit for (entity, operation).
    pub async fn flush(&self, entity: &str, operation: Operation) -> Result<FlushOutcome> {
        let descriptor = self.descriptor(entity)?;
        self.inner.write_cache.flush(descriptor.name(), operation).await
    }

    /// Flush every pending unit.
    pub async fn flush_all(&self) -> Result<Vec<FlushOutcome>> {
        self.inner.write_cache.flush_all().await
    }

    /// Replayer over this client's retry store and session.
    pub fn replayer(&self) -> Option<Replayer> {
        self.inner.retry_store.as_ref().map(|store| {
            Replayer::new(
                Arc::clone(store),
                Arc::clone(&self.inner.session),
                self.inner.config.retry_limit,
            )
        })
    }

    /// Run one replay pass over the retry store.
    pub async fn replay_pending(&self) -> Result<ReplaySummary> {
        let replayer = self
            .replayer()
            .ok_or_else(|| MailwireError::Config("no retry store configured".to_string()))?;
        replayer.run().await
    }

    pub(crate) async fn submit(&self, request: BatchRequest) -> Result<BatchResult> {
        self.inner.session.submit(request).await
    }
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    transport: Arc<dyn BatchTransport>,
    config: ClientConfig,
    retry_store: Option<Arc<dyn RetryStore>>,
    descriptors: Vec<EntityDescriptor>,
}

impl ClientBuilder {
    pub fn new(transport: Arc<dyn BatchTransport>) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
            retry_store: None,
            descriptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn refresh_on_save(mut self, refresh: bool) -> Self {
        self.config.refresh_on_save = refresh;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn retry_store(mut self, store: Arc<dyn RetryStore>) -> Self {
        self.retry_store = Some(store);
        self
    }

    #[must_use]
    pub fn descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validate the config and build the client.
    pub fn build(self) -> Result<Client> {
        let client = Client::new(self.config, self.transport, self.retry_store)?;
        for descriptor in self.descriptors {
            client.register(descriptor);
        }
        info!(
            debug = client.config().debug,
            retry_store = client.retry_store().is_some(),
            "client ready"
        );
        Ok(client)
    }
}
