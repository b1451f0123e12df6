//! In-process key-value backend.
//!
//! Only meaningful within one process: tests and `backend: memory` trial runs.

use super::KvBackend;
use crate::error::StateStoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn backend_type(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StateStoreError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_previous_value() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty());

        backend.put("k", b"one").await.unwrap();
        backend.put("k", b"two").await.unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }
}
