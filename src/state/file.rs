//! Directory-backed key-value backend.
//!
//! One file per key. Writes go to a temporary sibling first and are renamed
//! into place, so a concurrent reader sees either the old or the new value.

use super::KvBackend;
use crate::error::StateStoreError;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    fn backend_type(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateStoreError::Transport(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StateStoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StateStoreError::Transport(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key, std::process::id()));

        tokio::fs::write(&tmp, value).await.map_err(|e| {
            StateStoreError::Transport(format!("cannot write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            StateStoreError::Transport(format!("cannot replace {}: {}", path.display(), e))
        })?;

        tracing::trace!(path = %path.display(), bytes = value.len(), "State file written");
        Ok(())
    }
}
