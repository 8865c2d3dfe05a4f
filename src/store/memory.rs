use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{StateStore, StoreResult};

/// In-process store backed by a `HashMap`
///
/// State does not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        self.documents.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.documents.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_overwrites_previous_value() {
        let store = MemoryStore::new();
        store.put("k", json!(1)).await.unwrap();
        store.put("k", json!(2)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_value() {
        let store = MemoryStore::new();
        store.put("k", json!("v")).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);

        // Deleting again is a no-op
        store.delete("k").await.unwrap();
    }
}
