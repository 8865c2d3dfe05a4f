//! OpenAI-compatible API handlers
//!
//! - `POST /v1/chat/completions` - failover-routed passthrough, streaming or not
//! - `GET /v1/models` - static model listing

pub mod completions;
pub mod extractor;
pub mod models;
