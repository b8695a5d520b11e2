//! Core types for Agentrelay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Conversation identifier - cheaply cloneable, fixed for a whole multi-hop run
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ContextId(Arc<str>);

impl ContextId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContextId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<ContextId> for String {
    fn from(id: ContextId) -> Self {
        id.0.to_string()
    }
}

// ---------------------------------------------------------------------------
// Agent cards
// ---------------------------------------------------------------------------

/// What an agent process sends when it registers. Timestamps are assigned by the directory.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl AgentRegistration {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            version: "1.0.0".to_string(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }
}

/// Directory record describing one agent's identity, endpoint, and capabilities.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    pub endpoint: String,
    pub capabilities: BTreeSet<String>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl AgentCard {
    pub fn from_registration(registration: AgentRegistration, now: DateTime<Utc>) -> Self {
        Self {
            name: registration.name,
            description: registration.description,
            version: registration.version,
            endpoint: registration.endpoint,
            capabilities: registration.capabilities,
            registered_at: now,
            last_heartbeat_at: now,
        }
    }

    /// Case-insensitive tag match, using Unicode lowercasing like the matcher does.
    pub fn has_capability(&self, capability: &str) -> bool {
        let wanted = capability.to_lowercase();
        self.capabilities.iter().any(|c| c.to_lowercase() == wanted)
    }
}

/// Optional field updates carried by a renewal. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<BTreeSet<String>>,
}

impl CardUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.version.is_none()
            && self.endpoint.is_none()
            && self.capabilities.is_none()
    }
}

// ---------------------------------------------------------------------------
// MCP server cards
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McpRegistration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub endpoint: String,
    /// Transport spoken by the tool server, e.g. "streamable_http" or "sse".
    #[serde(default = "default_mcp_protocol")]
    pub protocol: String,
}

fn default_mcp_protocol() -> String {
    "streamable_http".to_string()
}

impl McpRegistration {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            endpoint: endpoint.into(),
            protocol: default_mcp_protocol(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }
}

/// Tool-server descriptor, keyed by service name in its own namespace.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McpCard {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    pub protocol: String,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl McpCard {
    pub fn from_registration(registration: McpRegistration, now: DateTime<Utc>) -> Self {
        Self {
            name: registration.name,
            description: registration.description,
            endpoint: registration.endpoint,
            protocol: registration.protocol,
            registered_at: now,
            last_heartbeat_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McpUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

// ---------------------------------------------------------------------------
// Tasks and outcomes
// ---------------------------------------------------------------------------

/// A unit of work travelling along a handover chain.
///
/// `hop_count` always equals `visited.len()`; both only change through [`Task::visit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    context_id: ContextId,
    payload: String,
    capability_hint: Option<String>,
    hop_count: u32,
    visited: Vec<String>,
}

impl Task {
    pub fn new(context_id: impl Into<ContextId>, payload: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            payload: payload.into(),
            capability_hint: None,
            hop_count: 0,
            visited: Vec::new(),
        }
    }

    pub fn with_capability_hint(mut self, hint: impl Into<String>) -> Self {
        self.capability_hint = Some(hint.into());
        self
    }

    /// Record a send to `agent`.
    pub fn visit(&mut self, agent: impl Into<String>) {
        self.visited.push(agent.into());
        self.hop_count += 1;
    }

    pub fn has_visited(&self, agent: &str) -> bool {
        self.visited.iter().any(|v| v == agent)
    }

    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn capability_hint(&self) -> Option<&str> {
        self.capability_hint.as_deref()
    }

    pub fn hop_count(&self) -> u32 {
        self.hop_count
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn into_visited(self) -> Vec<String> {
        self.visited
    }
}

/// What an agent or router answers to a message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum RoutingOutcome {
    #[serde(rename = "answer")]
    FinalAnswer { content: String },
    #[serde(rename = "handover")]
    HandoverSuggestion { card: AgentCard },
    #[serde(rename = "no-route")]
    NoRoute,
}

impl RoutingOutcome {
    pub fn answer(content: impl Into<String>) -> Self {
        Self::FinalAnswer {
            content: content.into(),
        }
    }

    pub fn handover(card: AgentCard) -> Self {
        Self::HandoverSuggestion { card }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FinalAnswer { .. } => "answer",
            Self::HandoverSuggestion { .. } => "handover",
            Self::NoRoute => "no-route",
        }
    }
}
