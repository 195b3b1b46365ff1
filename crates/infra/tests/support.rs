//! Shared helpers for `mailwire-infra` integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use mailwire_core::testing::StubTransport;
use mailwire_core::{Client, RetryStore};
use mailwire_domain::{ClientConfig, FieldMap, Operation, PendingWriteUnit};
use mailwire_infra::FileRetryStore;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const TOKEN: &str = "infra-test-token";

/// Client over a stub transport with a file retry store in a temp dir.
pub struct FileHarness {
    pub client: Client,
    pub transport: Arc<StubTransport>,
    pub store: Arc<FileRetryStore>,
    pub dir: TempDir,
}

impl FileHarness {
    pub async fn new() -> Self {
        Self::with_retry_limit(5).await
    }

    pub async fn with_retry_limit(retry_limit: u32) -> Self {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = Arc::new(
            FileRetryStore::open(dir.path().join("retry")).await.expect("store should open"),
        );
        let transport = Arc::new(StubTransport::new());
        let config = ClientConfig {
            api_token: Some(TOKEN.to_string()),
            retry_limit,
            ..Default::default()
        };
        let client = Client::new(
            config,
            transport.clone(),
            Some(store.clone() as Arc<dyn RetryStore>),
        )
        .expect("client should build");
        Self { client, transport, store, dir }
    }

    /// File names currently in the retry directory.
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.store.dir())
            .expect("retry dir should be readable")
            .map(|e| e.expect("dir entry").file_name().into_string().expect("utf-8 name"))
            .collect();
        names.sort();
        names
    }
}

pub fn fields(pairs: &[(&str, Value)]) -> FieldMap {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

pub fn contact_unit(emails: &[&str]) -> PendingWriteUnit {
    let mut unit =
        PendingWriteUnit::new("Contact", Operation::AddOrUpdate, "addOrUpdateContacts");
    for email in emails {
        unit.push(fields(&[("email", json!(email))]), None);
    }
    unit
}
