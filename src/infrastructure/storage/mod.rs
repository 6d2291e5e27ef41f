//! File-based storage implementation

use async_trait::async_trait;
use std::path::PathBuf;

use crate::application::errors::StorageError;
use crate::domain::traits::Store;

/// Key-value store persisting each value as a JSON file under a base
/// directory. Slashes in keys become subdirectories.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        for part in key.split('/') {
            path.push(part);
        }
        path.set_extension("json");
        path
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FileStore {
        let base = std::env::temp_dir().join(format!("cogwheel-store-{}", uuid::Uuid::new_v4()));
        FileStore::new(base)
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let store = temp_store();
        store.init().await.unwrap();
        assert_eq!(store.get("guilds/42").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = temp_store();
        store.set("guilds/42", "{\"language\":\"fr\"}").await.unwrap();
        assert_eq!(
            store.get("guilds/42").await.unwrap().as_deref(),
            Some("{\"language\":\"fr\"}")
        );
        tokio::fs::remove_dir_all(&store.base_path).await.ok();
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = temp_store();
        store.set("k", "v").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        tokio::fs::remove_dir_all(&store.base_path).await.ok();
    }
}
