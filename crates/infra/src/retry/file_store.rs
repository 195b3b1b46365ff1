//! File-backed retry store
//!
//! One JSON document per deferred unit, named
//! `<entity>_<micros>_<token>_<attempts>.json`. The handle is the file stem.
//! Writes go to a `.tmp` sibling that is synced and renamed into place, so a
//! listed handle always points at a complete document.
//!
//! There is no locking. Two replayers racing on one handle may both submit
//! it; the one that loses the `remove` sees `NotFound` on its next load.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use mailwire_core::RetryStore;
use mailwire_domain::constants::{RETRY_FILE_EXTENSION, RETRY_FORMAT_VERSION};
use mailwire_domain::{MailwireError, PendingWriteUnit, Result, RetryHandle};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, ReadDir};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

const TOKEN_LEN: usize = 10;
const MAX_NAME_ATTEMPTS: usize = 8;

/// On-disk document for one unit.
#[derive(Debug, Serialize, Deserialize)]
struct StoredUnit {
    version: u32,
    stored_at: DateTime<Utc>,
    unit: PendingWriteUnit,
}

/// [`RetryStore`] over a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FileRetryStore {
    dir: PathBuf,
}

impl FileRetryStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `dir`, creating the directory now.
    ///
    /// # Errors
    /// `StoreUnavailable` when the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir).await.map_err(|e| unavailable(&store.dir, &e))?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document behind `handle`.
    ///
    /// # Errors
    /// `InvalidInput` when the handle is not a retry file name.
    pub fn path_for(&self, handle: &RetryHandle) -> Result<PathBuf> {
        if parse_handle(handle.as_str()).is_none() {
            return Err(MailwireError::InvalidInput(format!("not a retry handle: {handle}")));
        }
        Ok(self.dir.join(format!("{handle}.{RETRY_FILE_EXTENSION}")))
    }

    async fn write_new(&self, unit: &PendingWriteUnit, bytes: &[u8]) -> Result<RetryHandle> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let handle = new_handle(unit);
            let path = self.path_for(&handle)?;
            let temp_path = path.with_extension(format!("{RETRY_FILE_EXTENSION}.tmp"));

            if fs::try_exists(&path).await.map_err(|e| unavailable(&path, &e))? {
                continue;
            }
            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(unavailable(&temp_path, &err)),
            };

            let written: std::io::Result<()> = async {
                file.write_all(bytes).await?;
                file.sync_all().await?;
                drop(file);
                fs::rename(&temp_path, &path).await
            }
            .await;

            if let Err(err) = written {
                fs::remove_file(&temp_path).await.ok();
                return Err(unavailable(&path, &err));
            }
            return Ok(handle);
        }
        Err(MailwireError::StoreUnavailable(format!(
            "could not pick an unused retry file name in {}",
            self.dir.display()
        )))
    }
}

#[async_trait]
impl RetryStore for FileRetryStore {
    #[instrument(skip(self, unit), fields(entity = %unit.entity, items = unit.len()))]
    async fn store(&self, unit: &PendingWriteUnit) -> Result<RetryHandle> {
        fs::create_dir_all(&self.dir).await.map_err(|e| unavailable(&self.dir, &e))?;

        let document =
            StoredUnit { version: RETRY_FORMAT_VERSION, stored_at: Utc::now(), unit: unit.clone() };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let handle = self.write_new(unit, &bytes).await?;
        debug!(handle = %handle, attempts = unit.attempt_count, "unit stored");
        Ok(handle)
    }

    async fn load(&self, handle: &RetryHandle) -> Result<PendingWriteUnit> {
        let path = self.path_for(handle)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(MailwireError::NotFound(format!("retry file {}", path.display())));
            }
            Err(err) => return Err(unavailable(&path, &err)),
        };

        let document: StoredUnit = serde_json::from_slice(&bytes)?;
        if document.version != RETRY_FORMAT_VERSION {
            return Err(MailwireError::Serialization(format!(
                "{} has format version {}, expected {RETRY_FORMAT_VERSION}",
                path.display(),
                document.version
            )));
        }
        Ok(document.unit)
    }

    fn list_pending(&self) -> BoxStream<'_, Result<RetryHandle>> {
        enum Scan {
            Start,
            Reading(ReadDir),
            Done,
        }

        stream::unfold(Scan::Start, move |scan| async move {
            let mut entries = match scan {
                Scan::Start => match fs::read_dir(&self.dir).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == ErrorKind::NotFound => return None,
                    Err(err) => return Some((Err(unavailable(&self.dir, &err)), Scan::Done)),
                },
                Scan::Reading(entries) => entries,
                Scan::Done => return None,
            };
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        if let Some(handle) = handle_from_path(&entry.path()) {
                            return Some((Ok(handle), Scan::Reading(entries)));
                        }
                    }
                    Ok(None) => return None,
                    Err(err) => return Some((Err(unavailable(&self.dir, &err)), Scan::Done)),
                }
            }
        })
        .boxed()
    }

    async fn remove(&self, handle: &RetryHandle) -> Result<()> {
        let path = self.path_for(handle)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove retry file");
                Err(unavailable(&path, &err))
            }
        }
    }
}

/// Parts of a retry file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleParts<'a> {
    pub entity: &'a str,
    pub stored_micros: i64,
    pub token: &'a str,
    pub attempts: u32,
}

/// Split a handle into its parts; `None` if it is not a retry file stem.
pub fn parse_handle(stem: &str) -> Option<HandleParts<'_>> {
    let mut parts = stem.rsplitn(4, '_');
    let attempts = parts.next()?.parse().ok()?;
    let token = parts.next()?;
    let stored_micros = parts.next()?.parse().ok()?;
    let entity = parts.next()?;

    let entity_ok = !entity.is_empty() && entity.chars().all(is_name_char);
    let token_ok = !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric());
    (entity_ok && token_ok).then_some(HandleParts { entity, stored_micros, token, attempts })
}

fn handle_from_path(path: &Path) -> Option<RetryHandle> {
    if path.extension()?.to_str()? != RETRY_FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    parse_handle(stem).map(|_| RetryHandle::new(stem))
}

fn new_handle(unit: &PendingWriteUnit) -> RetryHandle {
    let entity: String = unit
        .entity
        .to_lowercase()
        .chars()
        .map(|c| if is_name_char(c) { c } else { '-' })
        .collect();
    let token: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(TOKEN_LEN).map(char::from).collect();
    RetryHandle::new(format!(
        "{entity}_{}_{token}_{}",
        Utc::now().timestamp_micros(),
        unit.attempt_count
    ))
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn unavailable(path: &Path, err: &std::io::Error) -> MailwireError {
    MailwireError::StoreUnavailable(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use mailwire_domain::{field_map, Operation};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn unit() -> PendingWriteUnit {
        let mut unit = PendingWriteUnit::new("Contact", Operation::AddOrUpdate, "addOrUpdateContacts");
        unit.push(field_map([("email", json!("a@b.com"))]), None);
        unit
    }

    #[test]
    fn test_parse_handle() {
        let parts = parse_handle("contact_1700000000000000_Ab3dE9xYz1_2").unwrap();
        assert_eq!(parts.entity, "contact");
        assert_eq!(parts.stored_micros, 1_700_000_000_000_000);
        assert_eq!(parts.token, "Ab3dE9xYz1");
        assert_eq!(parts.attempts, 2);

        assert_eq!(parse_handle("delivery_group_1_tok_0").unwrap().entity, "delivery_group");
        assert!(parse_handle("contact_abc_tok_1").is_none());
        assert!(parse_handle("contact_1_tok").is_none());
        assert!(parse_handle("../etc_1_tok_1").is_none());
        assert!(parse_handle("_1_tok_1").is_none());
    }

    #[test]
    fn test_new_handle_round_trips_through_parse() {
        let mut unit = unit();
        unit.entity = "Mail List".to_string();
        unit.attempt_count = 3;
        let handle = new_handle(&unit);
        let parts = parse_handle(handle.as_str()).unwrap();
        assert_eq!(parts.entity, "mail-list");
        assert_eq!(parts.attempts, 3);
        assert_eq!(parts.token.len(), TOKEN_LEN);
    }

    #[test]
    fn test_path_for_rejects_foreign_handles() {
        let store = FileRetryStore::new("/tmp/retry");
        assert!(store.path_for(&RetryHandle::new("../../passwd")).is_err());
        assert!(store.path_for(&RetryHandle::new("contact_1_a/b_1")).is_err());
        assert_eq!(
            store.path_for(&RetryHandle::new("contact_1_tok_0")).unwrap(),
            PathBuf::from("/tmp/retry/contact_1_tok_0.json")
        );
    }

    #[test]
    fn test_handle_from_path_filters_other_files() {
        assert!(handle_from_path(Path::new("/r/contact_1_tok_0.json")).is_some());
        assert!(handle_from_path(Path::new("/r/contact_1_tok_0.json.tmp")).is_none());
        assert!(handle_from_path(Path::new("/r/notes.json")).is_none());
        assert!(handle_from_path(Path::new("/r/contact_1_tok_0.txt")).is_none());
    }

    #[tokio::test]
    async fn test_store_writes_versioned_document() {
        let dir = TempDir::new().unwrap();
        let store = FileRetryStore::new(dir.path());

        let handle = store.store(&unit()).await.unwrap();

        let raw = std::fs::read_to_string(store.path_for(&handle).unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], json!(RETRY_FORMAT_VERSION));
        assert!(value["stored_at"].is_string());
        assert_eq!(value["unit"]["method"], json!("addOrUpdateContacts"));
        assert_eq!(value["unit"]["operation"], json!("addOrUpdate"));
    }

    #[tokio::test]
    async fn test_store_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FileRetryStore::new(dir.path());
        store.store(&unit()).await.unwrap();
        store.store(&unit()).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".json")));
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let store = FileRetryStore::new(dir.path());
        let handle = RetryHandle::new("contact_1_tok_0");
        let document = json!({
            "version": 99,
            "stored_at": "2026-01-01T00:00:00Z",
            "unit": unit(),
        });
        std::fs::write(store.path_for(&handle).unwrap(), document.to_string()).unwrap();

        assert!(matches!(store.load(&handle).await, Err(MailwireError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = FileRetryStore::new(dir.path().join("never-created"));
        let handles: Vec<_> = store.list_pending().collect().await;
        assert!(handles.is_empty());
    }
}
