//! HTTP client for a remote registry

use agentrelay_core::{
    AgentCard, AgentRegistration, Error, ErrorBody, McpCard, McpRegistration, RenewRequest, Result,
};
use agentrelay_routing::CandidateSource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Clone)]
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Removed {
    removed: bool,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(&self, registration: &AgentRegistration) -> Result<AgentCard> {
        self.expect_json(self.client.post(self.url("/agents/register")).json(registration)).await
    }

    pub async fn renew(&self, request: &RenewRequest) -> Result<AgentCard> {
        self.expect_json(self.client.post(self.url("/agents/renew")).json(request)).await
    }

    pub async fn lookup_by_name(&self, name: &str) -> Result<AgentCard> {
        self.expect_json(self.client.get(self.url("/agents/lookup")).query(&[("name", name)]))
            .await
    }

    pub async fn lookup_by_capability(&self, capability: Option<&str>) -> Result<Vec<AgentCard>> {
        let mut request = self.client.get(self.url("/agents/lookup"));
        if let Some(capability) = capability {
            request = request.query(&[("capability", capability)]);
        }
        self.expect_json(request).await
    }

    pub async fn list(&self) -> Result<Vec<AgentCard>> {
        self.expect_json(self.client.get(self.url("/agents"))).await
    }

    pub async fn deregister(&self, name: &str) -> Result<bool> {
        let removed: Removed = self
            .expect_json(self.client.delete(self.url("/agents/deregister")).query(&[("name", name)]))
            .await?;
        Ok(removed.removed)
    }

    pub async fn register_mcp(&self, registration: &McpRegistration) -> Result<McpCard> {
        self.expect_json(self.client.post(self.url("/mcp/register")).json(registration)).await
    }

    pub async fn lookup_mcp(&self, name: &str) -> Result<McpCard> {
        self.expect_json(self.client.get(self.url("/mcp/lookup")).query(&[("name", name)]))
            .await
    }

    pub async fn list_mcp(&self) -> Result<Vec<McpCard>> {
        self.expect_json(self.client.get(self.url("/mcp/servers"))).await
    }

    pub async fn mcp_servers_for_agent(&self, agent: &str) -> Result<Vec<McpCard>> {
        self.expect_json(self.client.get(self.url(&format!("/mcp/agent/{}/servers", agent))))
            .await
    }

    /// Send, then decode a success body or map an error body back onto the taxonomy.
    async fn expect_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| Error::Http(e.to_string()))?;
        if status.is_success() {
            return Ok(serde_json::from_slice(&bytes)?);
        }
        debug!("Registry answered {}", status);
        match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => Err(body.into_error()),
            Err(_) => Err(Error::Http(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&bytes)
            ))),
        }
    }
}

#[async_trait]
impl CandidateSource for RegistryClient {
    async fn candidates(&self, capability: Option<&str>) -> Result<Vec<AgentCard>> {
        self.lookup_by_capability(capability).await
    }
}
