//! Agent directory

use crate::clock::Clock;
use crate::directory::Directory;
use crate::lease::LeasePolicy;
use crate::store::RegistryStore;
use crate::sweeper::Sweep;
use crate::AGENTS_NAMESPACE;
use agentrelay_core::config::RegistryConfig;
use agentrelay_core::{AgentCard, AgentRegistration, CardUpdate, Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct AgentDirectory {
    inner: Directory<AgentCard>,
}

impl AgentDirectory {
    pub fn new(store: Arc<dyn RegistryStore>, clock: Arc<dyn Clock>, lease_ttl: Duration) -> Self {
        Self {
            inner: Directory::new(store, AGENTS_NAMESPACE, LeasePolicy::new(lease_ttl), clock),
        }
    }

    pub fn from_config(store: Arc<dyn RegistryStore>, clock: Arc<dyn Clock>, config: &RegistryConfig) -> Self {
        let dir = Self::new(store, clock, config.lease_ttl());
        Self {
            inner: dir.inner.with_write_attempts(config.write_attempts),
        }
    }

    /// Insert or fully replace the card for `registration.name`.
    pub async fn register(&self, registration: AgentRegistration) -> Result<AgentCard> {
        validate(&registration.name, &registration.endpoint)?;
        let card = AgentCard::from_registration(registration, self.inner.now());
        self.inner.register(card).await
    }

    /// Heartbeat, merging any provided fields into the stored card.
    pub async fn renew(&self, name: &str, update: CardUpdate) -> Result<AgentCard> {
        if let Some(endpoint) = &update.endpoint {
            validate(name, endpoint)?;
        }
        self.inner.renew(name, update).await
    }

    pub async fn lookup_by_name(&self, name: &str) -> Result<AgentCard> {
        self.inner.get_live(name).await
    }

    /// Live cards carrying `capability` (case-insensitive), or every live card when `None`.
    pub async fn lookup_by_capability(&self, capability: Option<&str>) -> Result<Vec<AgentCard>> {
        let live = self.inner.live().await?;
        Ok(match capability.map(str::trim).filter(|c| !c.is_empty()) {
            Some(capability) => live.into_iter().filter(|c| c.has_capability(capability)).collect(),
            None => live,
        })
    }

    pub async fn list(&self) -> Result<Vec<AgentCard>> {
        self.inner.live().await
    }

    pub async fn deregister(&self, name: &str) -> Result<bool> {
        self.inner.deregister(name).await
    }

    pub fn lease_ttl(&self) -> Duration {
        self.inner.policy().ttl()
    }
}

#[async_trait]
impl Sweep for AgentDirectory {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn sweep(&self) -> Result<usize> {
        self.inner.sweep().await
    }
}

fn validate(name: &str, endpoint: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidCard("name must not be empty".into()));
    }
    if endpoint.trim().is_empty() {
        return Err(Error::InvalidCard(format!("{}: endpoint must not be empty", name)));
    }
    Ok(())
}
