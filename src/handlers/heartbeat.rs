//! Liveness endpoints: heartbeat ingestion, state view, takeover check

use axum::{Json, body::Bytes, extract::State};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::liveness::{LivenessState, TakeoverStatus};

/// POST /heartbeat response
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub status: &'static str,
    pub local_last_seen: i64,
    pub recovered_from_downtime: bool,
    pub downtime_minutes: i64,
    pub message: String,
}

/// Generic acknowledgement
#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
    pub message: &'static str,
}

/// Parse an optional JSON object body; an empty body is an empty object
fn heartbeat_fields(body: &[u8]) -> AppResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(AppError::Validation(
            "heartbeat body must be a JSON object".to_string(),
        )),
        Err(e) => Err(AppError::Validation(format!("invalid heartbeat JSON: {e}"))),
    }
}

/// POST /heartbeat
pub async fn handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<HeartbeatResponse>> {
    let fields = heartbeat_fields(&body)?;
    let outcome = state.liveness().record_heartbeat(fields).await;

    let message = if outcome.recovered_from_downtime {
        format!(
            "Local agent back after {} minute(s) of silence",
            outcome.downtime_minutes
        )
    } else {
        "Heartbeat recorded".to_string()
    };

    Ok(Json(HeartbeatResponse {
        status: "ok",
        local_last_seen: outcome.local_last_seen,
        recovered_from_downtime: outcome.recovered_from_downtime,
        downtime_minutes: outcome.downtime_minutes,
        message,
    }))
}

/// GET /state
pub async fn state(State(state): State<AppState>) -> Json<LivenessState> {
    Json(state.liveness().state().await)
}

/// POST /state/reset
pub async fn reset_state(State(state): State<AppState>) -> Json<Ack> {
    state.liveness().reset_state().await;
    Json(Ack {
        status: "ok",
        message: "Liveness state reset",
    })
}

/// GET /takeover
pub async fn takeover(State(state): State<AppState>) -> Json<TakeoverStatus> {
    Json(state.liveness().should_take_over().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_is_empty_object() {
        assert!(heartbeat_fields(b"").unwrap().is_empty());
        assert!(heartbeat_fields(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_object_body_is_kept() {
        let fields = heartbeat_fields(br#"{"host":"laptop","pid":42}"#).unwrap();
        assert_eq!(fields["host"], "laptop");
        assert_eq!(fields["pid"], 42);
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        assert!(matches!(
            heartbeat_fields(b"[1,2]"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            heartbeat_fields(b"{not json"),
            Err(AppError::Validation(_))
        ));
    }
}
