//! MCP server directory and per-agent access grants
//!
//! Server cards follow exactly the same lease rules as agent cards. Grants
//! are kept in a separate namespace keyed by server name, so re-registering
//! a server (a full replace) never drops the agents allowed to use it.
//! Explicit deregistration drops the server's grants; a lapsed server keeps
//! them until the sweep finds its card gone.

use crate::clock::Clock;
use crate::directory::Directory;
use crate::lease::LeasePolicy;
use crate::store::{Expect, RegistryStore};
use crate::sweeper::Sweep;
use crate::{MCP_GRANTS_NAMESPACE, MCP_NAMESPACE};
use agentrelay_core::config::RegistryConfig;
use agentrelay_core::{Error, McpCard, McpRegistration, McpUpdate, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Agents allowed to use one MCP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct Grants {
    agents: BTreeSet<String>,
}

pub struct McpDirectory {
    inner: Directory<McpCard>,
    store: Arc<dyn RegistryStore>,
    write_attempts: u32,
}

impl McpDirectory {
    pub fn new(store: Arc<dyn RegistryStore>, clock: Arc<dyn Clock>, lease_ttl: Duration) -> Self {
        Self {
            inner: Directory::new(store.clone(), MCP_NAMESPACE, LeasePolicy::new(lease_ttl), clock),
            store,
            write_attempts: 3,
        }
    }

    pub fn from_config(store: Arc<dyn RegistryStore>, clock: Arc<dyn Clock>, config: &RegistryConfig) -> Self {
        let dir = Self::new(store, clock, config.lease_ttl());
        let attempts = config.write_attempts.max(1);
        Self {
            inner: dir.inner.with_write_attempts(attempts),
            store: dir.store,
            write_attempts: attempts,
        }
    }

    pub async fn register(&self, registration: McpRegistration) -> Result<McpCard> {
        if registration.name.trim().is_empty() {
            return Err(Error::InvalidCard("name must not be empty".into()));
        }
        if registration.endpoint.trim().is_empty() {
            return Err(Error::InvalidCard(format!("{}: endpoint must not be empty", registration.name)));
        }
        let card = McpCard::from_registration(registration, self.inner.now());
        self.inner.register(card).await
    }

    pub async fn renew(&self, name: &str, update: McpUpdate) -> Result<McpCard> {
        if update.endpoint.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(Error::InvalidCard(format!("{}: endpoint must not be empty", name)));
        }
        self.inner.renew(name, update).await
    }

    pub async fn lookup(&self, name: &str) -> Result<McpCard> {
        self.inner.get_live(name).await
    }

    pub async fn list(&self) -> Result<Vec<McpCard>> {
        self.inner.live().await
    }

    /// Removes the server card together with its grants.
    pub async fn deregister(&self, name: &str) -> Result<bool> {
        let removed = self.inner.deregister(name).await?;
        let revoked = self.revoke_all(name).await?;
        if revoked > 0 {
            info!("Dropped {} grant(s) of deregistered MCP server {}", revoked, name);
        }
        Ok(removed)
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Allow `agent` to use `server`. The server must be registered and live.
    pub async fn grant(&self, server: &str, agent: &str) -> Result<()> {
        if agent.trim().is_empty() {
            return Err(Error::InvalidCard("agent name must not be empty".into()));
        }
        self.lookup(server).await?;
        let changed = self
            .update_grants(server, |grants| grants.agents.insert(agent.to_string()))
            .await?;
        if changed {
            info!("Granted MCP server {} to agent {}", server, agent);
        }
        Ok(())
    }

    /// Withdraw access. Returns whether the agent had been granted; absent is not an error.
    pub async fn revoke(&self, server: &str, agent: &str) -> Result<bool> {
        let changed = self
            .update_grants(server, |grants| grants.agents.remove(agent))
            .await?;
        if changed {
            info!("Revoked MCP server {} from agent {}", server, agent);
        }
        Ok(changed)
    }

    /// Drop every grant of `server`. Returns how many agents lost access.
    pub async fn revoke_all(&self, server: &str) -> Result<usize> {
        match self.store.get(MCP_GRANTS_NAMESPACE, server).await {
            Ok(stored) => self.drop_grants(server, stored.version, &stored.bytes).await,
            Err(Error::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub async fn allowed_agents(&self, server: &str) -> Result<Vec<String>> {
        Ok(self.read_grants(server).await?.0.agents.into_iter().collect())
    }

    /// Live servers `agent` may use, ordered by name.
    pub async fn servers_for_agent(&self, agent: &str) -> Result<Vec<McpCard>> {
        let mut servers = Vec::new();
        for card in self.list().await? {
            if self.read_grants(&card.name).await?.0.agents.contains(agent) {
                servers.push(card);
            }
        }
        Ok(servers)
    }

    async fn read_grants(&self, server: &str) -> Result<(Grants, Expect)> {
        match self.store.get(MCP_GRANTS_NAMESPACE, server).await {
            Ok(stored) => Ok((serde_json::from_slice(&stored.bytes)?, Expect::Version(stored.version))),
            Err(Error::NotFound(_)) => Ok((Grants::default(), Expect::Absent)),
            Err(e) => Err(e),
        }
    }

    /// Delete a grant set if it is still at `version`. Losing to a concurrent
    /// grant or revoke leaves it in place.
    async fn drop_grants(&self, server: &str, version: u64, bytes: &[u8]) -> Result<usize> {
        let count = serde_json::from_slice::<Grants>(bytes)
            .map(|g| g.agents.len())
            .unwrap_or(0);
        match self
            .store
            .delete(MCP_GRANTS_NAMESPACE, server, Expect::Version(version))
            .await
        {
            Ok(()) => Ok(count),
            Err(Error::NotFound(_)) | Err(Error::VersionConflict { .. }) => {
                debug!("Grants of {} changed while dropping them", server);
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete grant sets whose server card no longer exists. Returns how many sets went.
    async fn prune_grants(&self) -> Result<usize> {
        let mut pruned = 0;
        for (server, stored) in self.store.scan(MCP_GRANTS_NAMESPACE).await? {
            match self.store.get(MCP_NAMESPACE, &server).await {
                Ok(_) => continue,
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            if self.drop_grants(&server, stored.version, &stored.bytes).await? > 0 {
                pruned += 1;
            }
        }
        if pruned > 0 {
            info!("Pruned grants of {} departed MCP server(s)", pruned);
        }
        Ok(pruned)
    }

    /// Read-modify-write the grant set with compare-and-swap. `apply` reports
    /// whether it changed anything; unchanged sets are not written back.
    async fn update_grants<F>(&self, server: &str, apply: F) -> Result<bool>
    where
        F: Fn(&mut Grants) -> bool,
    {
        let mut last_err = None;
        for _ in 0..self.write_attempts {
            let (mut grants, expect) = self.read_grants(server).await?;
            if !apply(&mut grants) {
                return Ok(false);
            }
            let written = if grants.agents.is_empty() {
                self.store.delete(MCP_GRANTS_NAMESPACE, server, expect).await
            } else {
                let bytes = serde_json::to_vec(&grants)?;
                self.store
                    .put(MCP_GRANTS_NAMESPACE, server, bytes, expect)
                    .await
                    .map(|_| ())
            };
            match written {
                Ok(()) => return Ok(true),
                Err(e @ Error::VersionConflict { .. }) | Err(e @ Error::NotFound(_)) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            Error::version_conflict(format!("{}/{}", MCP_GRANTS_NAMESPACE, server), None, None)
        }))
    }
}

#[async_trait]
impl Sweep for McpDirectory {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    /// Expired server cards plus the grant sets they left behind.
    async fn sweep(&self) -> Result<usize> {
        let cards = self.inner.sweep().await?;
        Ok(cards + self.prune_grants().await?)
    }
}
