//! Storage adapters behind the persistence manager

use crate::errors::{DataError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key/value backend. Failures must be reported, never left as partial writes.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn save(&self, key: &str, data: &Value) -> Result<()>;

    /// `Ok(None)` when the key was never saved
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn save(&self, key: &str, data: &Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), data.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

const EXTENSION: &str = "json";

/// One JSON file per key under a root directory.
///
/// Writes go to a temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a file name. Anything outside `[A-Za-z0-9_-]` is
    /// percent-encoded so keys can never escape the root.
    pub fn file_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => name.push(byte as char),
                _ => name.push_str(&format!("%{:02X}", byte)),
            }
        }
        self.root.join(format!("{}.{}", name, EXTENSION))
    }
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn save(&self, key: &str, data: &Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.file_for(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(data)?;

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key = %key, path = %path.display(), "Saved entry");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.file_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DataError::Storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.file_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        storage.save("a", &json!({ "x": 1 })).await.unwrap();

        assert_eq!(storage.load("a").await.unwrap(), Some(json!({ "x": 1 })));
        assert_eq!(storage.load("b").await.unwrap(), None);

        storage.delete("a").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("store"));

        assert_eq!(storage.load("missing").await.unwrap(), None);
        storage.save("doc:1", &json!([1, 2, 3])).await.unwrap();
        assert_eq!(storage.load("doc:1").await.unwrap(), Some(json!([1, 2, 3])));

        storage.delete("doc:1").await.unwrap();
        storage.delete("doc:1").await.unwrap();
        assert_eq!(storage.load("doc:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_storage_clear_only_removes_entries() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        storage.save("a", &json!(1)).await.unwrap();
        storage.save("b", &json!(2)).await.unwrap();
        storage.clear().await.unwrap();

        assert_eq!(storage.load("a").await.unwrap(), None);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let storage = FileStorage::new("/data");
        let path = storage.file_for("../etc/passwd");

        assert_eq!(path.parent(), Some(Path::new("/data")));
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("%2E%2E%2Fetc%2Fpasswd.json")
        );
    }
}
