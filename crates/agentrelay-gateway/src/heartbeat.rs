//! Agent-side lease keeper
//!
//! Registers once, then renews every interval. If the registry answers
//! not-registered (the lease lapsed, or the registry restarted with an empty
//! store) the agent registers again from scratch. Other failures are logged
//! and retried on the next tick. On cancellation the agent deregisters.

use crate::registry_client::RegistryClient;
use agentrelay_core::{AgentCard, AgentRegistration, CardUpdate, Error, RenewRequest, Result};
use agentrelay_registry::AgentDirectory;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Anything an agent can hold a lease with: a remote registry or an in-process directory.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, registration: &AgentRegistration) -> Result<AgentCard>;
    async fn renew(&self, name: &str) -> Result<AgentCard>;
    async fn deregister(&self, name: &str) -> Result<bool>;
}

#[async_trait]
impl Registrar for RegistryClient {
    async fn register(&self, registration: &AgentRegistration) -> Result<AgentCard> {
        RegistryClient::register(self, registration).await
    }

    async fn renew(&self, name: &str) -> Result<AgentCard> {
        RegistryClient::renew(self, &RenewRequest::heartbeat(name)).await
    }

    async fn deregister(&self, name: &str) -> Result<bool> {
        RegistryClient::deregister(self, name).await
    }
}

#[async_trait]
impl Registrar for AgentDirectory {
    async fn register(&self, registration: &AgentRegistration) -> Result<AgentCard> {
        AgentDirectory::register(self, registration.clone()).await
    }

    async fn renew(&self, name: &str) -> Result<AgentCard> {
        AgentDirectory::renew(self, name, CardUpdate::default()).await
    }

    async fn deregister(&self, name: &str) -> Result<bool> {
        AgentDirectory::deregister(self, name).await
    }
}

pub fn spawn_heartbeat(
    registrar: Arc<dyn Registrar>,
    registration: AgentRegistration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = registration.name.clone();
        let mut registered = register(registrar.as_ref(), &registration).await;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !registered {
                        registered = register(registrar.as_ref(), &registration).await;
                        continue;
                    }
                    match registrar.renew(&name).await {
                        Ok(_) => debug!("Heartbeat for {}", name),
                        Err(Error::NotRegistered(_)) => {
                            warn!("Lease for {} lapsed, re-registering", name);
                            registered = register(registrar.as_ref(), &registration).await;
                        }
                        Err(e) => warn!("Heartbeat for {} failed: {}", name, e),
                    }
                }
            }
        }

        match registrar.deregister(&name).await {
            Ok(_) => info!("Deregistered {} on shutdown", name),
            Err(e) => warn!("Deregistering {} failed: {}", name, e),
        }
    })
}

async fn register(registrar: &dyn Registrar, registration: &AgentRegistration) -> bool {
    match registrar.register(registration).await {
        Ok(card) => {
            info!("Registered {} at {}", card.name, card.endpoint);
            true
        }
        Err(e) => {
            warn!("Registering {} failed: {}", registration.name, e);
            false
        }
    }
}
