use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },
    #[error("failed to encode layout: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode layout: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Key-value store holding serialized layouts.
pub trait LayoutStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn write(&self, key: &str, value: &str) -> Result<(), PersistError>;
    /// Returns whether an entry existed.
    fn remove(&self, key: &str) -> Result<bool, PersistError>;
}

/// In-process store with an optional byte quota, modelled on browser local storage.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
    quota: Option<usize>,
    writes: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self { quota: Some(quota), ..Self::default() }
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    fn used_excluding(&self, key: &str) -> usize {
        self.entries.borrow().iter().filter(|(k, _)| k.as_str() != key).map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl LayoutStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        if let Some(quota) = self.quota {
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(self.used_excluding(key));
            if needed > available {
                return Err(PersistError::QuotaExceeded { needed, available });
            }
        }
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, PersistError> {
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }
}

/// One JSON file per key under `root`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }
}

impl LayoutStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, PersistError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_enforces_quota() {
        let store = MemoryStore::with_quota(32);
        store.write("layout", "{}").expect("fits");
        let err = store.write("layout", &"x".repeat(64)).expect_err("too large");
        assert!(matches!(err, PersistError::QuotaExceeded { .. }));
        assert_eq!(store.read("layout").expect("read").as_deref(), Some("{}"));
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn file_store_roundtrip_and_remove() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(dir.path().join("saves"));
        assert_eq!(store.read("roomcraft.layout").expect("read"), None);
        store.write("roomcraft.layout", "{\"objects\":[]}").expect("write");
        assert!(store.path_for("roomcraft.layout").exists());
        assert_eq!(store.read("roomcraft.layout").expect("read").as_deref(), Some("{\"objects\":[]}"));
        assert!(store.remove("roomcraft.layout").expect("remove"));
        assert!(!store.remove("roomcraft.layout").expect("remove"));
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let store = FileStore::new("/tmp/layouts");
        assert_eq!(store.path_for("../evil key"), PathBuf::from("/tmp/layouts/.._evil_key.json"));
    }
}
