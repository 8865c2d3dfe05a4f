//! Cache-aside layer in front of the durable health records
//!
//! The cache only ever short-circuits reads. It is not assumed to survive a
//! restart and is never the source of truth: a miss always falls through to
//! the loader, and only records the loader actually found are cached.

use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;

use super::GatewayHealth;

#[derive(Debug, Default)]
pub struct HealthCache {
    entries: RwLock<HashMap<String, GatewayHealth>>,
}

impl HealthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, id: &str) -> Option<GatewayHealth> {
        self.entries.read().await.get(id).copied()
    }

    pub async fn populate(&self, id: &str, health: GatewayHealth) {
        self.entries.write().await.insert(id.to_string(), health);
    }

    /// Check the cache, then `load` on a miss, caching whatever was found
    ///
    /// The lock is released before `load` runs. Loader errors pass through
    /// and leave the cache untouched.
    pub async fn get_or_load<F, Fut, E>(&self, id: &str, load: F) -> Result<Option<GatewayHealth>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<GatewayHealth>, E>>,
    {
        if let Some(hit) = self.lookup(id).await {
            return Ok(Some(hit));
        }

        let Some(loaded) = load().await? else {
            return Ok(None);
        };
        self.populate(id, loaded).await;
        Ok(Some(loaded))
    }
}
