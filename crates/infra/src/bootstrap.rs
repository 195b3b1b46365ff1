//! Client assembly from configuration

use std::sync::Arc;

use mailwire_core::{BatchTransport, Client};
use mailwire_domain::{ClientConfig, Result};
use tracing::info;

use crate::config;
use crate::retry::build_retry_store;
use crate::transport::TimeoutTransport;

/// Build a client over `transport` as `config` describes.
///
/// The transport is wrapped in a [`TimeoutTransport`] using the configured
/// connection timeout, and the retry store is created from `retryer`.
///
/// # Errors
/// `Config` for invalid options, `StoreUnavailable` when the retry
/// directory cannot be created.
pub async fn connect(config: ClientConfig, transport: Arc<dyn BatchTransport>) -> Result<Client> {
    config.validate()?;
    let transport: Arc<dyn BatchTransport> =
        Arc::new(TimeoutTransport::new(transport, config.connection_timeout()));
    let retry_store = build_retry_store(&config.retryer).await?;

    let client = Client::new(config, transport, retry_store)?;
    info!(
        retryer = %client.config().retryer.kind,
        retry_limit = client.config().retry_limit,
        timeout_secs = client.config().connection_timeout_secs,
        "client connected"
    );
    Ok(client)
}

/// [`connect`] with configuration from [`config::load`].
///
/// # Errors
/// As [`config::load`] and [`connect`].
pub async fn connect_from_env(transport: Arc<dyn BatchTransport>) -> Result<Client> {
    connect(config::load()?, transport).await
}
