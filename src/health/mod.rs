//! Per-gateway health records
//!
//! Every configured gateway has one [`GatewayHealth`] record, created lazily
//! on first read and only ever overwritten. Reads go cache → durable store →
//! default; writes update the cache immediately and persist best-effort.

mod cache;

pub use cache::HealthCache;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::store::{self, SharedStore, StoreResult};

/// Weight of a new latency sample in the moving average
pub const LATENCY_EWMA_WEIGHT: f64 = 0.2;

/// Health state of one gateway
///
/// Timestamps are epoch milliseconds; 0 means "never" / "no cooldown".
/// Missing fields in a persisted record fall back to their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayHealth {
    pub consecutive_failures: u32,
    pub cooldown_until: i64,
    pub last_success: i64,
    pub last_failure: i64,
    /// Exponentially weighted moving average, milliseconds
    pub avg_latency: f64,
    /// Successful requests only
    pub request_count: u64,
}

impl GatewayHealth {
    /// A gateway is healthy once its cooldown has elapsed
    pub fn is_healthy(&self, now_ms: i64) -> bool {
        self.cooldown_until <= now_ms
    }

    /// Fold a new latency sample into the moving average
    ///
    /// The first sample seeds the average.
    pub fn next_avg_latency(&self, sample_ms: f64) -> f64 {
        if self.avg_latency == 0.0 {
            sample_ms
        } else {
            self.avg_latency * (1.0 - LATENCY_EWMA_WEIGHT) + sample_ms * LATENCY_EWMA_WEIGHT
        }
    }

    /// Remaining cooldown, 0 when healthy
    pub fn cooldown_remaining_ms(&self, now_ms: i64) -> i64 {
        (self.cooldown_until - now_ms).max(0)
    }
}

/// Partial update merged into a [`GatewayHealth`]
///
/// `None` leaves the current value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthPatch {
    pub consecutive_failures: Option<u32>,
    pub cooldown_until: Option<i64>,
    pub last_success: Option<i64>,
    pub last_failure: Option<i64>,
    pub avg_latency: Option<f64>,
    pub request_count: Option<u64>,
}

impl HealthPatch {
    pub fn apply(&self, current: GatewayHealth) -> GatewayHealth {
        GatewayHealth {
            consecutive_failures: self
                .consecutive_failures
                .unwrap_or(current.consecutive_failures),
            cooldown_until: self.cooldown_until.unwrap_or(current.cooldown_until),
            last_success: self.last_success.unwrap_or(current.last_success),
            last_failure: self.last_failure.unwrap_or(current.last_failure),
            avg_latency: self.avg_latency.unwrap_or(current.avg_latency),
            request_count: self.request_count.unwrap_or(current.request_count),
        }
    }
}

/// Durable store key for a gateway's record
pub fn health_key(gateway_id: &str) -> String {
    format!("gateway_health:{gateway_id}")
}

/// Cached + persisted health records
#[derive(Debug)]
pub struct GatewayHealthStore {
    cache: HealthCache,
    store: SharedStore,
    metrics: Arc<Metrics>,
}

impl GatewayHealthStore {
    pub fn new(store: SharedStore, metrics: Arc<Metrics>) -> Self {
        Self {
            cache: HealthCache::new(),
            store,
            metrics,
        }
    }

    /// Current health for `id`; never fails
    ///
    /// A store read error is logged, counted, and treated as a miss.
    pub async fn get(&self, id: &str) -> GatewayHealth {
        self.fetch(id).await.unwrap_or_default()
    }

    /// Cached or durable record, or the default when none exists yet
    async fn fetch(&self, id: &str) -> StoreResult<GatewayHealth> {
        let key = health_key(id);
        let found = self
            .cache
            .get_or_load(id, || store::load::<GatewayHealth>(self.store.as_ref(), &key))
            .await;

        found.map(Option::unwrap_or_default).map_err(|e| {
            self.metrics.persistence_failure("gateway_health");
            tracing::warn!(
                gateway_id = %id,
                error = %e,
                "Failed to load gateway health from store, using default"
            );
            e
        })
    }

    /// Merge `patch` into the current record and write it back
    ///
    /// Returns the merged record. Persistence failures are swallowed. When
    /// the stored record cannot be read, the patch is applied to a default
    /// record that only the cache sees, leaving the stored one intact. A
    /// later update may still overwrite it from the cache; lost updates
    /// between concurrent writers are accepted either way.
    pub async fn update(&self, id: &str, patch: HealthPatch) -> GatewayHealth {
        match self.fetch(id).await {
            Ok(current) => {
                let next = patch.apply(current);
                self.write(id, next).await;
                next
            }
            Err(_) => {
                let next = patch.apply(GatewayHealth::default());
                self.cache.populate(id, next).await;
                next
            }
        }
    }

    /// Overwrite a record with the default (no cooldown, zero failures)
    pub async fn reset(&self, id: &str) {
        self.write(id, GatewayHealth::default()).await;
    }

    /// Reset every listed gateway
    pub async fn reset_all<'a, I>(&self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in ids {
            self.reset(id).await;
        }
    }

    async fn write(&self, id: &str, health: GatewayHealth) {
        self.cache.populate(id, health).await;

        if let Err(e) = store::save(self.store.as_ref(), &health_key(id), &health).await {
            self.metrics.persistence_failure("gateway_health");
            tracing::warn!(
                gateway_id = %id,
                error = %e,
                "Failed to persist gateway health (non-fatal, cached value still applies)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StateStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<serde_json::Value>> {
            Err(StoreError::Backend("unreachable".to_string()))
        }
        async fn put(&self, _key: &str, _value: serde_json::Value) -> StoreResult<()> {
            Err(StoreError::Backend("unreachable".to_string()))
        }
        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Backend("unreachable".to_string()))
        }
    }

    /// Memory store whose next read fails once when armed
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_next_get: AtomicBool,
    }

    #[async_trait]
    impl StateStore for FlakyStore {
        async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
            if self.fail_next_get.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Backend("read timed out".to_string()));
            }
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
            self.inner.put(key, value).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.inner.delete(key).await
        }
    }

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new().unwrap())
    }

    #[test]
    fn test_is_healthy_boundary() {
        let health = GatewayHealth {
            cooldown_until: 1_000,
            ..Default::default()
        };
        assert!(!health.is_healthy(999));
        assert!(health.is_healthy(1_000));
        assert!(health.is_healthy(1_001));
        assert!(GatewayHealth::default().is_healthy(0));
    }

    #[test]
    fn test_ewma_seeded_by_first_sample() {
        let fresh = GatewayHealth::default();
        assert_eq!(fresh.next_avg_latency(250.0), 250.0);

        let warm = GatewayHealth {
            avg_latency: 100.0,
            ..Default::default()
        };
        assert!((warm.next_avg_latency(200.0) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_persisted_record_with_missing_fields_loads() {
        let health: GatewayHealth =
            serde_json::from_str(r#"{"consecutiveFailures": 4}"#).unwrap();
        assert_eq!(health.consecutive_failures, 4);
        assert_eq!(health.cooldown_until, 0);
        assert_eq!(health.avg_latency, 0.0);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(GatewayHealth::default()).unwrap();
        assert!(json.get("cooldownUntil").is_some());
        assert!(json.get("requestCount").is_some());
    }

    #[tokio::test]
    async fn test_get_unknown_gateway_returns_default() {
        let store = GatewayHealthStore::new(Arc::new(MemoryStore::new()), metrics());
        assert_eq!(store.get("nope").await, GatewayHealth::default());
    }

    #[tokio::test]
    async fn test_update_merges_and_persists() {
        let durable = Arc::new(MemoryStore::new());
        let store = GatewayHealthStore::new(durable.clone(), metrics());

        store
            .update(
                "g",
                HealthPatch {
                    consecutive_failures: Some(2),
                    cooldown_until: Some(5_000),
                    ..Default::default()
                },
            )
            .await;
        let merged = store
            .update(
                "g",
                HealthPatch {
                    last_failure: Some(4_000),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(merged.consecutive_failures, 2);
        assert_eq!(merged.cooldown_until, 5_000);
        assert_eq!(merged.last_failure, 4_000);

        let persisted: GatewayHealth = store::load(durable.as_ref(), &health_key("g"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted, merged);
    }

    #[tokio::test]
    async fn test_fresh_instance_reads_durable_store() {
        let durable: SharedStore = Arc::new(MemoryStore::new());
        let first = GatewayHealthStore::new(durable.clone(), metrics());
        first
            .update(
                "g",
                HealthPatch {
                    request_count: Some(7),
                    ..Default::default()
                },
            )
            .await;

        // A new invocation starts with an empty cache
        let second = GatewayHealthStore::new(durable, metrics());
        assert_eq!(second.get("g").await.request_count, 7);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let m = metrics();
        let store = GatewayHealthStore::new(Arc::new(BrokenStore), m.clone());

        let merged = store
            .update(
                "g",
                HealthPatch {
                    consecutive_failures: Some(1),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(merged.consecutive_failures, 1);
        // Cache still serves the write
        assert_eq!(store.get("g").await.consecutive_failures, 1);
        assert_eq!(m.persistence_failures_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_all_restores_defaults() {
        let store = GatewayHealthStore::new(Arc::new(MemoryStore::new()), metrics());
        for id in ["a", "b"] {
            store
                .update(
                    id,
                    HealthPatch {
                        consecutive_failures: Some(3),
                        cooldown_until: Some(i64::MAX),
                        ..Default::default()
                    },
                )
                .await;
        }

        store.reset_all(["a", "b"]).await;
        assert_eq!(store.get("a").await, GatewayHealth::default());
        assert_eq!(store.get("b").await, GatewayHealth::default());
    }

    #[tokio::test]
    async fn test_read_error_never_overwrites_stored_record() {
        let durable = Arc::new(FlakyStore::default());
        let stored = GatewayHealth {
            request_count: 7,
            avg_latency: 180.0,
            ..Default::default()
        };
        store::save(durable.as_ref(), &health_key("g"), &stored)
            .await
            .unwrap();

        let m = metrics();
        let health = GatewayHealthStore::new(durable.clone(), m.clone());
        durable.fail_next_get.store(true, Ordering::SeqCst);

        let merged = health
            .update(
                "g",
                HealthPatch {
                    consecutive_failures: Some(1),
                    cooldown_until: Some(9_000),
                    ..Default::default()
                },
            )
            .await;

        // The in-process view still carries the penalty
        assert_eq!(merged.cooldown_until, 9_000);
        assert_eq!(health.get("g").await.cooldown_until, 9_000);
        assert_eq!(m.persistence_failures_count(), 1);

        let persisted: GatewayHealth = store::load(durable.as_ref(), &health_key("g"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted, stored);
    }
}
