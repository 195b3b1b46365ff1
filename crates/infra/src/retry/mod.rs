//! Retry store implementations

pub mod file_store;

use std::sync::Arc;

use mailwire_core::RetryStore;
use mailwire_domain::{Result, RetryerConfig, RetryerKind};
use tracing::info;

pub use file_store::{parse_handle, FileRetryStore, HandleParts};

/// Build the retry store selected by `config`, or `None` for `type = none`.
///
/// # Errors
/// `StoreUnavailable` when the file store directory cannot be created.
pub async fn build_retry_store(config: &RetryerConfig) -> Result<Option<Arc<dyn RetryStore>>> {
    match config.kind {
        RetryerKind::None => Ok(None),
        RetryerKind::File => {
            let store = FileRetryStore::open(config.resolved_path()).await?;
            info!(dir = %store.dir().display(), "file retry store ready");
            Ok(Some(Arc::new(store)))
        }
    }
}
