//! Run-scoped, write-once decision stores.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tollgate_core::ids::RunId;
use tollgate_core::ports::DecisionStore;
use tollgate_core::{Error, Result};
use tracing::debug;

/// In-process store shared by every job task of a run.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionStore for InMemoryDecisionStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Err(Error::DuplicateWrite(key.to_string()));
        }
        debug!(key, %value, "Decision stored");
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<serde_json::Value> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::DecisionNotFound(key.to_string()))
    }
}

/// Filesystem store visible to executors in other processes.
///
/// Each run owns `<root>/<run id>/`; each key is one `<key>.json` file,
/// published with a hard link so readers never observe a partial write and
/// a second writer fails.
#[derive(Debug, Clone)]
pub struct FileDecisionStore {
    dir: PathBuf,
}

impl FileDecisionStore {
    /// Open (creating if needed) the directory for `run_id` under `root`.
    pub async fn open(root: impl AsRef<Path>, run_id: RunId) -> Result<Self> {
        let dir = root.as_ref().join(run_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove the run directory and everything in it.
    pub async fn teardown(self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(Error::InvalidDecisionKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl DecisionStore for FileDecisionStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let path = self.entry_path(key)?;
        let staging = self
            .dir
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));

        tokio::fs::write(&staging, serde_json::to_vec(&value)?).await?;
        let linked = tokio::fs::hard_link(&staging, &path).await;
        let _ = tokio::fs::remove_file(&staging).await;

        match linked {
            Ok(()) => {
                debug!(key, path = %path.display(), "Decision written");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::DuplicateWrite(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<serde_json::Value> {
        let path = self.entry_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::DecisionNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_get_before_put_is_not_found() {
        let store = InMemoryDecisionStore::new();
        assert!(matches!(
            store.get("changes_detected").await,
            Err(Error::DecisionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_write_once() {
        let store = InMemoryDecisionStore::new();
        store.put_flag("changes_detected", false).await.unwrap();
        assert!(matches!(
            store.put_flag("changes_detected", true).await,
            Err(Error::DuplicateWrite(_))
        ));
        assert!(!store.get_flag("changes_detected").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_flag_rejects_non_boolean() {
        let store = InMemoryDecisionStore::new();
        store.put("changes_detected", json!("yes")).await.unwrap();
        assert!(matches!(
            store.get_flag("changes_detected").await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_visible_to_second_handle() {
        let root = tempfile::tempdir().unwrap();
        let run_id = RunId::new();
        let writer = FileDecisionStore::open(root.path(), run_id).await.unwrap();
        let reader = FileDecisionStore::open(root.path(), run_id).await.unwrap();

        assert!(matches!(
            reader.get("changes_detected").await,
            Err(Error::DecisionNotFound(_))
        ));
        writer.put_flag("changes_detected", true).await.unwrap();
        assert!(reader.get_flag("changes_detected").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_write_once() {
        let root = tempfile::tempdir().unwrap();
        let store = FileDecisionStore::open(root.path(), RunId::new()).await.unwrap();
        store.put("meta", json!({"n": 1})).await.unwrap();
        assert!(matches!(
            store.put("meta", json!({"n": 2})).await,
            Err(Error::DuplicateWrite(_))
        ));
        assert_eq!(store.get("meta").await.unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_keys() {
        let root = tempfile::tempdir().unwrap();
        let store = FileDecisionStore::open(root.path(), RunId::new()).await.unwrap();
        for key in ["../escape", "a/b", "", ".hidden"] {
            assert!(matches!(
                store.put_flag(key, true).await,
                Err(Error::InvalidDecisionKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_file_store_teardown_is_scoped_to_run() {
        let root = tempfile::tempdir().unwrap();
        let first = FileDecisionStore::open(root.path(), RunId::new()).await.unwrap();
        let second = FileDecisionStore::open(root.path(), RunId::new()).await.unwrap();
        first.put_flag("changes_detected", true).await.unwrap();
        second.put_flag("changes_detected", false).await.unwrap();

        let first_dir = first.dir().to_path_buf();
        first.teardown().await.unwrap();
        assert!(!first_dir.exists());
        assert!(!second.get_flag("changes_detected").await.unwrap());
    }
}
