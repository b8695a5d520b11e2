//! Wire protocol: JSON bodies exchanged with the registry and with agents
//!
//! Registry:
//!   POST /agents/register   { "name": "weather-agent", "endpoint": "...", "capabilities": ["weather"] }
//!   POST /agents/renew      { "name": "weather-agent", "capabilities": ["weather", "forecast"] }
//!   error                   { "error": "not-registered", "message": "weather-agent" }
//!
//! Agent / router message:
//!   → { "contextId": "ctx-1", "payload": "Weather in Berlin?", "hopHint": 1, "visited": ["router"] }
//!   ← { "kind": "answer", "content": "12°C" }
//!   ← { "kind": "handover", "card": { "name": "weather-agent", ... } }
//!   ← { "kind": "no-route" }

use crate::types::{CardUpdate, ContextId, McpUpdate, Task};
use serde::{Deserialize, Serialize};

/// Request sent to an agent or router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub context_id: ContextId,
    pub payload: String,
    /// Number of sends made in this conversation so far, including this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop_hint: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visited: Vec<String>,
}

impl MessageRequest {
    pub fn new(context_id: impl Into<ContextId>, payload: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            payload: payload.into(),
            hop_hint: None,
            capability_hint: None,
            visited: Vec::new(),
        }
    }

    pub fn with_capability_hint(mut self, hint: impl Into<String>) -> Self {
        self.capability_hint = Some(hint.into());
        self
    }
}

impl From<&Task> for MessageRequest {
    fn from(task: &Task) -> Self {
        Self {
            context_id: task.context_id().clone(),
            payload: task.payload().to_string(),
            hop_hint: Some(task.hop_count()),
            capability_hint: task.capability_hint().map(String::from),
            visited: task.visited().to_vec(),
        }
    }
}

/// Heartbeat for an agent card, with optional field updates merged in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub name: String,
    #[serde(flatten)]
    pub update: CardUpdate,
}

impl RenewRequest {
    pub fn heartbeat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update: CardUpdate::default(),
        }
    }
}

/// Heartbeat for an MCP server card.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McpRenewRequest {
    pub name: String,
    #[serde(flatten)]
    pub update: McpUpdate,
}

/// Error body returned by every HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::Error> for ErrorBody {
    fn from(e: &crate::Error) -> Self {
        let message = match e {
            crate::Error::NotRegistered(name) | crate::Error::NotFound(name) => name.clone(),
            other => other.to_string(),
        };
        Self::new(e.code(), message)
    }
}

impl ErrorBody {
    /// Rebuild a typed error from a body received over the wire.
    pub fn into_error(self) -> crate::Error {
        match self.error.as_str() {
            "not-registered" => crate::Error::NotRegistered(self.message),
            "not-found" => crate::Error::NotFound(self.message),
            "conflict" => crate::Error::version_conflict(self.message, None, None),
            "invalid-card" => crate::Error::InvalidCard(self.message),
            "no-route" => crate::Error::NoRoute(self.message),
            "storage" => crate::Error::Storage(self.message),
            _ => crate::Error::Http(format!("{}: {}", self.error, self.message)),
        }
    }
}
