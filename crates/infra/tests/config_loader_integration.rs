//! Integration tests for configuration loading and client assembly

mod support;

use std::sync::Arc;

use mailwire_core::testing::StubTransport;
use mailwire_domain::{MailwireError, Operation, RetryerKind};
use mailwire_infra::config;
use serde_json::json;
use support::fields;
use tempfile::TempDir;

#[test]
fn test_load_config_from_json_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("mailwire.json");
    std::fs::write(
        &path,
        r#"{
            "api_token": "json-token",
            "refresh_on_save": true,
            "retry_limit": 4,
            "retryer": { "type": "file", "path": "/var/spool/mailwire" },
            "debug": false,
            "connection_timeout_secs": 15
        }"#,
    )
    .expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("Failed to load JSON config");

    assert_eq!(config.api_token.as_deref(), Some("json-token"));
    assert!(config.refresh_on_save);
    assert_eq!(config.retry_limit, 4);
    assert_eq!(config.retryer.kind, RetryerKind::File);
    assert_eq!(config.retryer.resolved_path(), std::path::PathBuf::from("/var/spool/mailwire"));
    assert_eq!(config.connection_timeout_secs, 15);
}

#[test]
fn test_load_config_from_toml_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("mailwire.toml");
    std::fs::write(
        &path,
        r#"
api_token = "toml-token"
retry_limit = 9

[retryer]
type = "file"
"#,
    )
    .expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("Failed to load TOML config");

    assert_eq!(config.retry_limit, 9);
    assert_eq!(config.retryer.kind, RetryerKind::File);
    assert!(config.retryer.path.is_none());
    assert!(config.retryer.resolved_path().starts_with(std::env::temp_dir()));
}

#[test]
fn test_load_config_with_minimal_fields() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "api_token": "t" }"#).expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("Failed to load minimal config");

    assert_eq!(config.retry_limit, 5);
    assert_eq!(config.retryer.kind, RetryerKind::None);
    assert!(!config.debug);
}

#[test]
fn test_load_config_from_nonexistent_file() {
    let result = config::load_from_file(Some("/nonexistent/path/mailwire.json".into()));

    match result {
        Err(MailwireError::Config(msg)) => {
            assert!(msg.contains("not found"), "Error message should mention 'not found'");
        }
        other => panic!("Expected Config error, got {other:?}"),
    }
}

#[test]
fn test_load_config_with_invalid_format() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("mailwire.json");
    std::fs::write(&path, r#"{ "this is": "not valid" "#).expect("Failed to write config");

    match config::load_from_file(Some(path)) {
        Err(MailwireError::Config(msg)) => {
            assert!(msg.contains("Invalid JSON"), "Error message should mention invalid JSON");
        }
        other => panic!("Expected Config error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_builds_file_backed_client() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("mailwire.json");
    let retry_dir = dir.path().join("spool");
    std::fs::write(
        &path,
        json!({
            "api_token": "connect-token",
            "retryer": { "type": "file", "path": retry_dir },
        })
        .to_string(),
    )
    .expect("Failed to write config");
    let config = config::load_from_file(Some(path)).expect("Failed to load config");

    let transport = Arc::new(StubTransport::new());
    let client = mailwire_infra::connect(config, transport.clone()).await.expect("connect");

    assert!(retry_dir.is_dir());
    assert!(client.retry_store().is_some());

    client
        .record_with("Contact", fields(&[("email", json!("c@x.com"))]))
        .unwrap()
        .persist()
        .unwrap();
    transport.push_error(MailwireError::Transport("offline".to_string()));
    let outcome = client.flush("Contact", Operation::AddOrUpdate).await.unwrap();
    assert!(outcome.is_deferred());
    assert_eq!(std::fs::read_dir(&retry_dir).unwrap().count(), 1);

    let summary = client.replay_pending().await.unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(transport.logins(), vec!["connect-token".to_string()]);
}

#[tokio::test]
async fn test_connect_without_retryer_has_no_store() {
    let config = mailwire_domain::ClientConfig {
        api_token: Some("t".to_string()),
        ..Default::default()
    };
    let client = mailwire_infra::connect(config, Arc::new(StubTransport::new()))
        .await
        .expect("connect");
    assert!(client.retry_store().is_none());
    assert!(client.replayer().is_none());
}

#[tokio::test]
async fn test_connect_rejects_invalid_config() {
    let config = mailwire_domain::ClientConfig {
        connection_timeout_secs: 0,
        ..Default::default()
    };
    let result = mailwire_infra::connect(config, Arc::new(StubTransport::new())).await;
    assert!(matches!(result, Err(MailwireError::Config(_))));
}
