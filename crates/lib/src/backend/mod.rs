//! Wellbeing agent backend: request payload, transport seam and HTTP client.
//!
//! The controller only sees [`Transport`]; [`AgentClient`] is the reqwest implementation
//! used in production.

mod http;
#[cfg(test)]
pub(crate) mod scripted;

pub use http::AgentClient;

use crate::checkin::CheckinSnapshot;
use crate::session::HistoryEntry;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

/// Response body as a stream of raw chunks.
pub type BodyStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// JSON body of `POST /api/ai/wellbeing-agent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRequest {
    pub message: String,
    pub checkin: CheckinSnapshot,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("rate limited (429)")]
    RateLimited,
    #[error("agent api error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("agent request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("reading response stream failed: {0}")]
    StreamRead(String),
}

/// Opens a streaming turn against the agent backend.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request`; on a 2xx status return the body stream. 429 must map to
    /// [`TransportError::RateLimited`] without reading a body stream.
    async fn open(&self, request: &AgentRequest) -> Result<BodyStream, TransportError>;
}
