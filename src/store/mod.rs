//! Durable key/value state store
//!
//! Gateway health records and the liveness singleton are persisted through
//! [`StateStore`]. The transport behind the store is deliberately abstract:
//! the router only needs last-write-wins `get`/`put` of JSON documents.
//!
//! Two backends ship with the crate:
//! - [`MemoryStore`] for tests and single-process deployments
//! - [`FileStore`] writing one JSON document per key into a directory

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a state store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Last-write-wins JSON document store
///
/// Implementations must be safe to share across handlers. No transactional
/// guarantees are expected: concurrent read-modify-write cycles may lose
/// updates.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Fetch the document stored under `key`, if any
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;

    /// Overwrite the document stored under `key`
    async fn put(&self, key: &str, value: serde_json::Value) -> StoreResult<()>;

    /// Remove the document stored under `key` (no-op when absent)
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Shared store handle
pub type SharedStore = Arc<dyn StateStore>;

/// Load and deserialize a typed document
pub async fn load<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and store a typed document
pub async fn save<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> StoreResult<()> {
    let value = serde_json::to_value(value)?;
    store.put(key, value).await
}
