//! reqwest client for the wellbeing agent endpoint (SSE-style streaming response).

use crate::backend::{AgentRequest, BodyStream, Transport, TransportError};
use crate::config::BackendConfig;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;

/// Client for the agent HTTP API.
#[derive(Clone)]
pub struct AgentClient {
    url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl AgentClient {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            url: backend.endpoint_url(),
            api_token: backend.api_token.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for AgentClient {
    /// POST the turn; stream the body on success.
    async fn open(&self, request: &AgentRequest) -> Result<BodyStream, TransportError> {
        let mut req = self
            .client
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .json(request);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let stream = res.bytes_stream().map(|chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| TransportError::StreamRead(e.to_string()))
        });
        Ok(stream.boxed())
    }
}
