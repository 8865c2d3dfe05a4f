//! Incident ledger endpoints

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::handlers::AppState;
use crate::handlers::openai::extractor::OpenAiJson;
use crate::liveness::Incident;

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub status: &'static str,
    pub incident: Incident,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub count: usize,
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
    pub cleared: usize,
}

/// POST /gateway/incident
pub async fn record(
    State(state): State<AppState>,
    OpenAiJson(incident): OpenAiJson<Incident>,
) -> (StatusCode, Json<RecordResponse>) {
    let incident = state.incidents().record(incident).await;
    (
        StatusCode::CREATED,
        Json(RecordResponse {
            status: "ok",
            incident,
        }),
    )
}

/// GET /gateway/incidents?limit=n
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<ListResponse> {
    let incidents = state.incidents().list(params.limit).await;
    Json(ListResponse {
        count: incidents.len(),
        incidents,
    })
}

/// POST /gateway/incidents/clear
pub async fn clear(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = state.incidents().clear().await;
    Json(ClearResponse {
        status: "ok",
        cleared,
    })
}
