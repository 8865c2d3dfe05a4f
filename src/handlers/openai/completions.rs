//! OpenAI-compatible chat completions passthrough
//!
//! Handles POST /v1/chat/completions. The body is forwarded untouched to the
//! gateway picked by the failover router; only `messages` is checked.

use axum::{
    Extension, Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::handlers::openai::extractor::{OpenAiError, OpenAiJson};
use crate::metrics::RequestOutcome;
use crate::middleware::RequestId;
use crate::router::{RouteFailure, RouteOptions, RoutedResponse};
use crate::upstream::UpstreamBody;

/// Header naming the gateway that served the request
pub const GATEWAY_USED_HEADER: &str = "x-router-gateway-used";
/// Header carrying the number of attempts made
pub const ATTEMPTS_HEADER: &str = "x-router-attempts";

/// Upstream headers forwarded to the caller
const FORWARDED_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::CACHE_CONTROL];

/// Routing metadata attached to JSON responses as `_router_meta`
#[derive(Debug, Serialize)]
pub struct RouterMeta<'a> {
    pub gateway_used: &'a str,
    pub gateway_name: &'a str,
    pub attempts: usize,
}

/// POST /v1/chat/completions
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    OpenAiJson(payload): OpenAiJson<Value>,
) -> Response {
    if let Err(rejection) = validate(&payload) {
        record_outcome(&state, RequestOutcome::InvalidRequest);
        tracing::debug!(request_id = %request_id, "Rejected chat request without messages array");
        return rejection.into_response();
    }

    let stream = payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    tracing::debug!(
        request_id = %request_id,
        stream = stream,
        messages_count = payload["messages"].as_array().map_or(0, Vec::len),
        "Received chat completions request"
    );

    match state
        .router()
        .route(&payload, RouteOptions { stream }, request_id)
        .await
    {
        Ok(routed) => {
            record_outcome(&state, RequestOutcome::Success);
            match into_response(routed) {
                Ok(response) => response,
                Err(e) => e.into_response(),
            }
        }
        Err(failure) => {
            let outcome = if failure.all_gateways_exhausted() {
                RequestOutcome::AllGatewaysExhausted
            } else {
                RequestOutcome::AttemptsExhausted
            };
            record_outcome(&state, outcome);
            failure_response(&failure)
        }
    }
}

/// `messages` must be present and an array
fn validate(payload: &Value) -> Result<(), (StatusCode, Json<OpenAiError>)> {
    match payload.get("messages") {
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err((
            StatusCode::BAD_REQUEST,
            Json(OpenAiError::invalid_param("messages must be an array", "messages")),
        )),
        None => Err((
            StatusCode::BAD_REQUEST,
            Json(OpenAiError::invalid_param("messages is required", "messages")),
        )),
    }
}

fn record_outcome(state: &AppState, outcome: RequestOutcome) {
    if let Err(e) = state.metrics().record_request(outcome) {
        tracing::warn!(error = %e, "Metrics recording failed (non-fatal)");
    }
}

/// 503 body shared by both failure kinds
fn failure_response(failure: &RouteFailure) -> Response {
    let body = json!({
        "error": {
            "message": failure.to_string(),
            "type": failure.error_type(),
        },
        "router_meta": {
            "attempts": failure.attempts(),
        },
    });
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

fn into_response(routed: RoutedResponse) -> Result<Response, AppError> {
    let RoutedResponse {
        gateway,
        attempts,
        status,
        headers: upstream_headers,
        body,
    } = routed;

    let mut builder = Response::builder().status(status);
    if let Ok(value) = HeaderValue::from_str(gateway.id()) {
        builder = builder.header(GATEWAY_USED_HEADER, value);
    }
    builder = builder.header(ATTEMPTS_HEADER, attempts);

    let body = match body {
        UpstreamBody::Streaming(upstream) => {
            builder = forward_headers(builder, &upstream_headers);
            Body::from_stream(upstream.bytes_stream())
        }
        UpstreamBody::Buffered(bytes) => match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(mut object)) => {
                let meta = RouterMeta {
                    gateway_used: gateway.id(),
                    gateway_name: gateway.name(),
                    attempts,
                };
                object.insert(
                    "_router_meta".to_string(),
                    serde_json::to_value(meta).map_err(encode_failed)?,
                );
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&object).map_err(encode_failed)?)
            }
            _ => {
                builder = forward_headers(builder, &upstream_headers);
                Body::from(bytes)
            }
        },
    };

    builder
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

fn forward_headers(
    mut builder: axum::http::response::Builder,
    upstream_headers: &HeaderMap,
) -> axum::http::response::Builder {
    for name in &FORWARDED_HEADERS {
        if let Some(value) = upstream_headers.get(name) {
            builder = builder.header(name, value);
        }
    }
    builder
}

fn encode_failed(e: serde_json::Error) -> AppError {
    AppError::Internal(format!("Failed to encode response body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_messages_array() {
        assert!(validate(&json!({"messages": []})).is_ok());
        assert!(validate(&json!({"messages": [{"role": "user", "content": "hi"}]})).is_ok());

        let (status, Json(err)) = validate(&json!({"model": "x"})).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error.param.as_deref(), Some("messages"));

        let (status, _) = validate(&json!({"messages": "hi"})).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(validate(&json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_failure_response_shape() {
        let response = failure_response(&RouteFailure::AttemptsExhausted {
            attempts: 2,
            last_error: "timeout".to_string(),
        });
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "router_error");
        assert_eq!(json["router_meta"]["attempts"], 2);
    }
}
