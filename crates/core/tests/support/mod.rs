//! Shared test helpers for `mailwire-core` integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use mailwire_core::testing::{MemoryRetryStore, StubTransport};
use mailwire_core::{Client, RetryStore};
use mailwire_domain::{ClientConfig, FieldMap};
use serde_json::Value;

pub const TOKEN: &str = "test-token";

/// Client wired to a stub transport and, optionally, an in-memory store.
pub struct Harness {
    pub client: Client,
    pub transport: Arc<StubTransport>,
    pub store: Arc<MemoryRetryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(mut config: ClientConfig) -> Self {
        config.api_token.get_or_insert_with(|| TOKEN.to_string());
        let transport = Arc::new(StubTransport::new());
        let store = Arc::new(MemoryRetryStore::new());
        let client = Client::new(
            config,
            transport.clone(),
            Some(store.clone() as Arc<dyn RetryStore>),
        )
        .expect("client should build");
        Self { client, transport, store }
    }
}

pub fn fields(pairs: &[(&str, Value)]) -> FieldMap {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}
