//! Transport seam between the routing client and agents

use crate::retry::Retryable;
use agentrelay_core::{MessageRequest, RoutingOutcome};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("target unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

/// Delivers one message to one agent endpoint and returns its decoded reply.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send(&self, endpoint: &str, request: &MessageRequest) -> Result<RoutingOutcome, TransportError>;
}

/// JSON over HTTP POST.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn send(&self, endpoint: &str, request: &MessageRequest) -> Result<RoutingOutcome, TransportError> {
        debug!("POST {} (context {})", endpoint, request.context_id);
        let response = self
            .client
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    TransportError::Malformed(format!("bad endpoint {}: {}", endpoint, e))
                } else {
                    TransportError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 | 502 | 503 | 504 => TransportError::Unavailable(format!("{}: {}", status, body)),
                code => TransportError::Rejected { status: code, body },
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}
