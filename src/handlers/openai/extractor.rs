//! JSON extractor with OpenAI-style error responses
//!
//! Wraps Axum's `Json` extractor so body rejections come back in the same
//! `{ "error": { "message", "type" } }` envelope chat clients already parse.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// OpenAI-compatible error body
#[derive(Debug, Serialize)]
pub struct OpenAiError {
    pub error: OpenAiErrorBody,
}

#[derive(Debug, Serialize)]
pub struct OpenAiErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl OpenAiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            error: OpenAiErrorBody {
                message: message.into(),
                error_type: "invalid_request_error".to_string(),
                param: None,
            },
        }
    }

    /// Invalid request blamed on one field
    pub fn invalid_param(message: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            error: OpenAiErrorBody {
                message: message.into(),
                error_type: "invalid_request_error".to_string(),
                param: Some(param.into()),
            },
        }
    }
}

/// Rejection produced by [`OpenAiJson`]
///
/// - JSON syntax errors → 400
/// - Data shape errors → 422
/// - Missing `Content-Type: application/json` → 400
#[derive(Debug)]
pub struct OpenAiJsonRejection(JsonRejection);

impl IntoResponse for OpenAiJsonRejection {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            JsonRejection::JsonSyntaxError(_) => (StatusCode::BAD_REQUEST, self.0.body_text()),
            JsonRejection::JsonDataError(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.0.body_text())
            }
            JsonRejection::MissingJsonContentType(_) => (
                StatusCode::BAD_REQUEST,
                "Content-Type must be application/json".to_string(),
            ),
            _ => (StatusCode::BAD_REQUEST, self.0.body_text()),
        };
        tracing::debug!(status = %status, reason = %message, "Rejected JSON body");
        (status, Json(OpenAiError::invalid_request(message))).into_response()
    }
}

/// Drop-in replacement for `axum::Json` on public endpoints
pub struct OpenAiJson<T>(pub T);

impl<S, T> FromRequest<S> for OpenAiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = OpenAiJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(OpenAiJson(value)),
            Err(rejection) => Err(OpenAiJsonRejection(rejection)),
        }
    }
}
