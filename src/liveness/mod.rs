//! Primary-agent liveness tracking
//!
//! The primary agent posts heartbeats; a remote fallback polls the takeover
//! decision. Heartbeats and incidents share one [`LivenessState`] document
//! in the durable store, loaded with per-field defaults and overwritten
//! wholesale on every change.

pub mod incidents;

pub use incidents::{INCIDENT_CAPACITY, Incident, IncidentLedger};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::clock::SharedClock;
use crate::metrics::Metrics;
use crate::store::{self, SharedStore, StoreResult};

/// Durable store key of the liveness document
pub const LIVENESS_KEY: &str = "liveness_state";

/// Heartbeats kept in history
pub const HISTORY_CAPACITY: usize = 100;

const MS_PER_MINUTE: f64 = 60_000.0;

/// One heartbeat as posted by the agent
///
/// Caller fields are kept verbatim next to `timestamp` (epoch ms).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl HeartbeatRecord {
    /// Build a record from caller fields
    ///
    /// An integer `timestamp` field is honored; anything else is replaced by `now_ms`.
    pub fn from_fields(mut fields: Map<String, Value>, now_ms: i64) -> Self {
        let timestamp = fields
            .remove("timestamp")
            .and_then(|v| v.as_i64())
            .unwrap_or(now_ms);
        Self { timestamp, fields }
    }
}

/// Singleton liveness document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessState {
    pub local_last_seen: i64,
    pub last_heartbeat: Option<HeartbeatRecord>,
    /// Oldest first
    pub heartbeat_history: VecDeque<HeartbeatRecord>,
    /// Oldest first
    pub gateway_incidents: VecDeque<Incident>,
    pub total_requests: u64,
    pub total_errors: u64,
}

impl LivenessState {
    /// Milliseconds since the last heartbeat
    pub fn silent_for_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.local_last_seen)
    }

    /// Whether the agent has been silent for longer than `timeout_ms`
    pub fn is_silent(&self, now_ms: i64, timeout_ms: u64) -> bool {
        self.silent_for_ms(now_ms) > i64::try_from(timeout_ms).unwrap_or(i64::MAX)
    }

    fn push_heartbeat(&mut self, record: HeartbeatRecord) {
        self.last_heartbeat = Some(record.clone());
        self.heartbeat_history.push_back(record);
        while self.heartbeat_history.len() > HISTORY_CAPACITY {
            self.heartbeat_history.pop_front();
        }
    }
}

/// Load/save access to the liveness document
///
/// Read-modify-write cycles within this process are serialized; writers in
/// other processes still race last-write-wins.
#[derive(Debug)]
pub struct LivenessStore {
    store: SharedStore,
    metrics: Arc<Metrics>,
    write_lock: Mutex<()>,
}

impl LivenessStore {
    pub fn new(store: SharedStore, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            metrics,
            write_lock: Mutex::new(()),
        }
    }

    /// Current document; defaults on a missing record or read error
    pub async fn load(&self) -> LivenessState {
        self.try_load().await.unwrap_or_default()
    }

    async fn try_load(&self) -> StoreResult<LivenessState> {
        store::load::<LivenessState>(self.store.as_ref(), LIVENESS_KEY)
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| {
                self.metrics.persistence_failure("liveness_state");
                tracing::warn!(error = %e, "Failed to load liveness state, using defaults");
                e
            })
    }

    /// Apply `change` to the current document and persist the result
    ///
    /// Returns the updated document and whatever `change` produced, even
    /// when persisting fails. If the stored document cannot be read, the
    /// change is applied to a default document that is returned but never
    /// written, so the stored one survives intact.
    pub async fn modify<F, R>(&self, change: F) -> (LivenessState, R)
    where
        F: FnOnce(&mut LivenessState) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let loaded = self.try_load().await;
        let readable = loaded.is_ok();
        let mut state = loaded.unwrap_or_default();
        let result = change(&mut state);
        if readable {
            self.save(&state).await;
        } else {
            tracing::warn!("Skipping liveness write; stored state could not be read");
        }
        (state, result)
    }

    /// Overwrite with defaults
    pub async fn reset(&self) -> LivenessState {
        let _guard = self.write_lock.lock().await;
        let state = LivenessState::default();
        self.save(&state).await;
        state
    }

    async fn save(&self, state: &LivenessState) {
        if let Err(e) = store::save(self.store.as_ref(), LIVENESS_KEY, state).await {
            self.metrics.persistence_failure("liveness_state");
            tracing::warn!(error = %e, "Failed to persist liveness state (non-fatal)");
        }
    }
}

/// Result of ingesting a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    pub recovered_from_downtime: bool,
    /// Rounded minutes of silence before this heartbeat; 0 unless recovered
    pub downtime_minutes: i64,
    pub local_last_seen: i64,
}

/// Advisory takeover decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TakeoverStatus {
    pub should_take_over: bool,
    pub local_last_seen: i64,
    pub silent_for_ms: i64,
}

/// Heartbeat ingestion and silence detection
#[derive(Debug)]
pub struct LivenessTracker {
    store: Arc<LivenessStore>,
    clock: SharedClock,
    metrics: Arc<Metrics>,
    timeout_ms: u64,
}

impl LivenessTracker {
    pub fn new(
        store: Arc<LivenessStore>,
        clock: SharedClock,
        metrics: Arc<Metrics>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            store,
            clock,
            metrics,
            timeout_ms,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Record a heartbeat and report whether it ends a downtime
    ///
    /// An agent never seen before has `localLastSeen == 0`, so its first
    /// heartbeat counts as a recovery.
    pub async fn record_heartbeat(&self, fields: Map<String, Value>) -> HeartbeatOutcome {
        let now = self.clock.now_ms();
        let timeout_ms = self.timeout_ms;

        let (_, outcome) = self
            .store
            .modify(|state| {
                let silent_ms = state.silent_for_ms(now);
                let was_down = state.is_silent(now, timeout_ms);
                let downtime_minutes = if was_down {
                    (silent_ms as f64 / MS_PER_MINUTE).round() as i64
                } else {
                    0
                };

                state.local_last_seen = now;
                state.push_heartbeat(HeartbeatRecord::from_fields(fields, now));

                HeartbeatOutcome {
                    recovered_from_downtime: was_down,
                    downtime_minutes,
                    local_last_seen: now,
                }
            })
            .await;

        self.metrics.heartbeat();

        if outcome.recovered_from_downtime {
            tracing::info!(
                downtime_minutes = outcome.downtime_minutes,
                "Local agent recovered from downtime"
            );
        } else {
            tracing::debug!(local_last_seen = now, "Heartbeat recorded");
        }

        outcome
    }

    /// Pure read: has the agent been silent longer than the timeout
    pub async fn should_take_over(&self) -> TakeoverStatus {
        let now = self.clock.now_ms();
        let state = self.store.load().await;
        TakeoverStatus {
            should_take_over: state.is_silent(now, self.timeout_ms),
            local_last_seen: state.local_last_seen,
            silent_for_ms: state.silent_for_ms(now),
        }
    }

    pub async fn state(&self) -> LivenessState {
        self.store.load().await
    }

    /// Wipe heartbeats, incidents, and counters
    pub async fn reset_state(&self) -> LivenessState {
        tracing::warn!("Liveness state reset");
        self.store.reset().await
    }
}
