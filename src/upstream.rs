//! HTTP client for upstream inference gateways
//!
//! Sends the opaque chat-completion payload to one gateway under a fixed
//! timeout. Non-streaming replies are buffered inside the timeout; streaming
//! replies are handed back as soon as the response headers arrive, and the
//! body is forwarded to the caller without buffering.

use axum::body::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;

/// Transport-level failures talking to a gateway
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Request to {gateway} timed out after {timeout_ms}ms")]
    Timeout { gateway: String, timeout_ms: u64 },

    #[error("Failed to connect to {gateway}: {reason}")]
    Connect { gateway: String, reason: String },

    #[error("Request to {gateway} failed: {reason}")]
    Request { gateway: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Body of an upstream reply
#[derive(Debug)]
pub enum UpstreamBody {
    Buffered(Bytes),
    /// Headers received, body not yet read
    Streaming(reqwest::Response),
}

/// Reply from a gateway (any status)
#[derive(Debug)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamReply {
    /// Short excerpt of a buffered body for error messages
    pub fn body_excerpt(&self, max_chars: usize) -> String {
        match &self.body {
            UpstreamBody::Buffered(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                text.chars().take(max_chars).collect()
            }
            UpstreamBody::Streaming(_) => String::new(),
        }
    }
}

/// Chat completions URL for a gateway base URL
///
/// Accepts base URLs with or without a trailing `/v1`.
pub fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

/// Gateway caller shared by all requests
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    api_key: Option<String>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            timeout,
        })
    }

    /// Send `payload` to `gateway`
    ///
    /// Any HTTP status is an `Ok` reply; only transport failures are errors.
    pub async fn send(
        &self,
        gateway: &GatewayConfig,
        payload: &serde_json::Value,
        stream: bool,
    ) -> Result<UpstreamReply, UpstreamError> {
        let url = completions_url(gateway.url());
        let mut request = self.http.post(&url).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = if stream && status.is_success() {
                UpstreamBody::Streaming(response)
            } else {
                UpstreamBody::Buffered(response.bytes().await?)
            };
            Ok::<_, reqwest::Error>(UpstreamReply {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(self.classify(gateway, e)),
            Err(_) => Err(UpstreamError::Timeout {
                gateway: gateway.id().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn classify(&self, gateway: &GatewayConfig, e: reqwest::Error) -> UpstreamError {
        let gateway = gateway.id().to_string();
        if e.is_timeout() {
            UpstreamError::Timeout {
                gateway,
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if e.is_connect() {
            UpstreamError::Connect {
                gateway,
                reason: e.to_string(),
            }
        } else {
            UpstreamError::Request {
                gateway,
                reason: e.to_string(),
            }
        }
    }
}
