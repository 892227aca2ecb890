//! Ignore-list persistence.
//!
//! The scheduler loads a mailbox's ignore list before every fetch cycle and
//! saves it after every successful fetch, keyed by the mailbox's canonical
//! URI string. Where the lists live is up to the [`IgnoreStore`]
//! implementation.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

/// Errors raised by an ignore-list store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing file is not valid JSON.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// No platform data directory is known.
    #[error("No data directory available")]
    NoDataDir,
}

/// Persistent ignore lists.
pub trait IgnoreStore: Send + Sync {
    /// Returns the ignore list stored under `key`, empty if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load_ignore(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Replaces the ignore list stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save_ignore(&self, key: &str, uids: &[String]) -> Result<(), StoreError>;
}

/// In-memory store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IgnoreStore for MemoryStore {
    fn load_ignore(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lists.get(key).cloned().unwrap_or_default())
    }

    fn save_ignore(&self, key: &str, uids: &[String]) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
        lists.insert(key.to_string(), uids.to_vec());
        Ok(())
    }
}

/// Store backed by a single JSON file mapping keys to uid lists.
///
/// Writes go to a temporary file that is renamed over the original, so a
/// crash never leaves a truncated file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store at `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns `<data dir>/mailwatch/ignore.json`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoDataDir`] if the platform has no data
    /// directory.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        dirs::data_dir()
            .map(|dir| dir.join("mailwatch").join("ignore.json"))
            .ok_or(StoreError::NoDataDir)
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, lists: &BTreeMap<String, Vec<String>>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(lists)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl IgnoreStore for JsonFileStore {
    fn load_ignore(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.remove(key).unwrap_or_default())
    }

    fn save_ignore(&self, key: &str, uids: &[String]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lists = self.read()?;
        lists.insert(key.to_string(), uids.to_vec());
        self.write(&lists)?;
        debug!(key, count = uids.len(), path = %self.path.display(), "ignore list saved");
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn uids(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("mailwatch-store-{}-{name}", std::process::id()))
            .join("ignore.json")
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load_ignore("imap://a@h/").unwrap().is_empty());
        store.save_ignore("imap://a@h/", &uids(&["1", "2"])).unwrap();
        assert_eq!(store.load_ignore("imap://a@h/").unwrap(), uids(&["1", "2"]));
        assert!(store.load_ignore("pop://a@h/").unwrap().is_empty());
    }

    #[test]
    fn test_json_store_round_trip() {
        let path = temp_path("round-trip");
        let _ = fs::remove_dir_all(path.parent().unwrap());

        let store = JsonFileStore::new(&path);
        assert!(store.load_ignore("imap://a@h/").unwrap().is_empty());
        store.save_ignore("imap://a@h/", &uids(&["7"])).unwrap();
        store.save_ignore("pop://b@h/", &uids(&["x", "y"])).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load_ignore("imap://a@h/").unwrap(), uids(&["7"]));
        assert_eq!(reopened.load_ignore("pop://b@h/").unwrap(), uids(&["x", "y"]));
        assert!(!path.with_extension("json.tmp").exists());

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let path = temp_path("garbage");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load_ignore("k"), Err(StoreError::Json(_))));

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
