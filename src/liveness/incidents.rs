//! Bounded incident ledger for post-mortems
//!
//! Incidents are stored inside the liveness document, oldest first, and
//! listed newest first. No deduplication and no severity: consumers filter
//! on the free-form `type`.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::LivenessStore;
use crate::clock::SharedClock;
use crate::metrics::Metrics;

/// Incidents kept before the oldest is evicted
pub const INCIDENT_CAPACITY: usize = 50;

/// Default page size of [`IncidentLedger::list`]
pub const DEFAULT_LIST_LIMIT: usize = 20;

const UNKNOWN_TYPE: &str = "unknown";

/// A reported anomaly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Epoch ms; filled with the receive time when absent
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339, server-assigned
    #[serde(default)]
    pub reported_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Incident {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }
}

fn rfc3339(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Append-only bounded incident log
#[derive(Debug)]
pub struct IncidentLedger {
    store: Arc<LivenessStore>,
    clock: SharedClock,
    metrics: Arc<Metrics>,
}

impl IncidentLedger {
    pub fn new(store: Arc<LivenessStore>, clock: SharedClock, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            clock,
            metrics,
        }
    }

    /// Stamp, append, and persist an incident; returns the stored record
    pub async fn record(&self, mut incident: Incident) -> Incident {
        let now = self.clock.now_ms();
        incident.reported_at = rfc3339(now);
        if incident.timestamp == 0 {
            incident.timestamp = now;
        }
        if incident.kind.trim().is_empty() {
            incident.kind = UNKNOWN_TYPE.to_string();
        }

        let stored = incident.clone();
        self.store
            .modify(move |state| {
                state.gateway_incidents.push_back(incident);
                while state.gateway_incidents.len() > INCIDENT_CAPACITY {
                    state.gateway_incidents.pop_front();
                }
            })
            .await;

        self.metrics.incident();
        tracing::warn!(
            incident_type = %stored.kind,
            session_id = stored.session_id.as_deref().unwrap_or(""),
            hostname = stored.hostname.as_deref().unwrap_or(""),
            "Incident recorded"
        );

        stored
    }

    /// Most recent `limit` incidents (default 20), newest first
    pub async fn list(&self, limit: Option<usize>) -> Vec<Incident> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let state = self.store.load().await;
        state
            .gateway_incidents
            .into_iter()
            .rev()
            .take(limit)
            .collect()
    }

    /// Remove every incident; returns how many were removed
    pub async fn clear(&self) -> usize {
        let (_, cleared) = self
            .store
            .modify(|state| {
                let cleared = state.gateway_incidents.len();
                state.gateway_incidents.clear();
                cleared
            })
            .await;

        tracing::info!(cleared = cleared, "Incident ledger cleared");
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn ledger_at(start_ms: i64) -> (IncidentLedger, Arc<ManualClock>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = Arc::new(LivenessStore::new(
            Arc::new(MemoryStore::new()),
            metrics.clone(),
        ));
        let clock = Arc::new(ManualClock::new(start_ms));
        (IncidentLedger::new(store, clock.clone(), metrics), clock)
    }

    #[test]
    fn test_incident_wire_format() {
        let incident: Incident = serde_json::from_value(json!({
            "type": "stuck_session",
            "sessionId": "abc",
            "stuckDurationSeconds": 42.5,
            "agentVersion": "1.2"
        }))
        .unwrap();

        assert_eq!(incident.kind, "stuck_session");
        assert_eq!(incident.session_id.as_deref(), Some("abc"));
        assert_eq!(incident.stuck_duration_seconds, Some(42.5));
        assert_eq!(incident.extra["agentVersion"], json!("1.2"));

        let out = serde_json::to_value(&incident).unwrap();
        assert_eq!(out["type"], json!("stuck_session"));
        assert_eq!(out["agentVersion"], json!("1.2"));
        assert!(out.get("hostname").is_none());
    }

    #[test]
    fn test_rfc3339_formatting() {
        assert_eq!(rfc3339(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(rfc3339(1_500), "1970-01-01T00:00:01.500Z");
    }

    #[tokio::test]
    async fn test_record_stamps_server_fields() {
        let (ledger, _clock) = ledger_at(86_400_000);
        let stored = ledger.record(Incident::default()).await;

        assert_eq!(stored.timestamp, 86_400_000);
        assert_eq!(stored.kind, "unknown");
        assert_eq!(stored.reported_at, "1970-01-02T00:00:00.000Z");

        let kept = ledger
            .record(Incident {
                timestamp: 5,
                ..Incident::new("gateway_down")
            })
            .await;
        assert_eq!(kept.timestamp, 5);
        assert_eq!(kept.kind, "gateway_down");
    }

    #[tokio::test]
    async fn test_list_is_newest_first_with_default_limit() {
        let (ledger, clock) = ledger_at(1_000);
        for i in 0..25 {
            clock.advance(1);
            ledger.record(Incident::new(format!("t{i}"))).await;
        }

        let recent = ledger.list(None).await;
        assert_eq!(recent.len(), DEFAULT_LIST_LIMIT);
        assert_eq!(recent[0].kind, "t24");
        assert_eq!(recent[19].kind, "t5");

        let two = ledger.list(Some(2)).await;
        assert_eq!(two.iter().map(|i| i.kind.as_str()).collect::<Vec<_>>(), ["t24", "t23"]);
    }

    #[tokio::test]
    async fn test_ledger_is_bounded() {
        let (ledger, _clock) = ledger_at(1_000);
        for i in 0..=INCIDENT_CAPACITY {
            ledger.record(Incident::new(format!("t{i}"))).await;
        }

        let all = ledger.list(Some(usize::MAX)).await;
        assert_eq!(all.len(), INCIDENT_CAPACITY);
        assert_eq!(all.first().unwrap().kind, format!("t{INCIDENT_CAPACITY}"));
        assert_eq!(all.last().unwrap().kind, "t1");
    }

    #[tokio::test]
    async fn test_clear_empties_ledger() {
        let (ledger, _clock) = ledger_at(1_000);
        ledger.record(Incident::new("a")).await;
        ledger.record(Incident::new("b")).await;

        assert_eq!(ledger.clear().await, 2);
        assert!(ledger.list(None).await.is_empty());
        assert_eq!(ledger.clear().await, 0);
    }
}
