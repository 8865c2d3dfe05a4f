//! OpenAI-compatible models list handler
//!
//! Static listing of the configured model ids; gateway health is not consulted.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::handlers::AppState;

/// Single entry in the models list
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelObject {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

impl ModelObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "model",
            created: 0,
            owned_by: "switchyard",
        }
    }
}

/// `GET /v1/models` response body
#[derive(Debug, Serialize)]
pub struct ModelsListResponse {
    pub object: &'static str,
    pub data: Vec<ModelObject>,
}

/// GET /v1/models
pub async fn handler(State(state): State<AppState>) -> Json<ModelsListResponse> {
    let data = state
        .config()
        .models
        .ids
        .iter()
        .map(ModelObject::new)
        .collect();

    Json(ModelsListResponse {
        object: "list",
        data,
    })
}
