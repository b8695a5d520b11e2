//! Service bootstrap for the registry and the router

use crate::agent_service::agent_router;
use crate::registry_client::RegistryClient;
use crate::registry_service::{registry_router, RegistryState};
use agentrelay_core::config::{BindMode, StoreBackend};
use agentrelay_core::{Error, RelayConfig, Result};
use agentrelay_registry::store::{MemoryStore, SqliteStore};
use agentrelay_registry::{spawn_sweeper, AgentDirectory, McpDirectory, RegistryStore, Sweep, SystemClock};
use agentrelay_routing::{CapabilityMatcher, Router as RelayRouter};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Build directories over the configured store backend.
pub fn registry_state(config: &RelayConfig) -> Result<Arc<RegistryState>> {
    let store: Arc<dyn RegistryStore> = match config.registry.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => {
            let path = config
                .registry
                .store
                .path
                .as_deref()
                .ok_or_else(|| Error::ConfigError("registry.store.path is required for sqlite".into()))?;
            Arc::new(SqliteStore::open(path)?)
        }
    };
    let clock = Arc::new(SystemClock);
    let agents = Arc::new(AgentDirectory::from_config(store.clone(), clock.clone(), &config.registry));
    let mcp = Arc::new(McpDirectory::from_config(store.clone(), clock, &config.registry));
    Ok(Arc::new(RegistryState::new(agents, mcp, store.backend())))
}

/// Serve `app` on an already bound listener until `cancel` fires.
pub async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

fn bind_addr(bind: &BindMode, port: u16) -> anyhow::Result<SocketAddr> {
    Ok(format!("{}:{}", bind.to_addr(), port).parse()?)
}

pub async fn start_registry(config: RelayConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let state = registry_state(&config)?;

    let sweeper = config.registry.sweep_interval().map(|interval| {
        let targets = vec![
            state.agents.clone() as Arc<dyn Sweep>,
            state.mcp.clone() as Arc<dyn Sweep>,
        ];
        spawn_sweeper(targets, interval, cancel.clone())
    });

    let addr = bind_addr(&config.server.bind, config.server.port)?;
    info!("Agentrelay registry v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", addr);
    info!("  Store:        {}", state.backend);
    info!("  Lease TTL:    {:?}", config.registry.lease_ttl());
    match config.registry.sweep_interval() {
        Some(interval) => info!("  Sweep:        every {:?}", interval),
        None => info!("  Sweep:        disabled (lazy expiry only)"),
    }

    let listener = TcpListener::bind(addr).await?;
    serve(listener, registry_router(state), cancel).await?;
    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }
    Ok(())
}

pub async fn start_router(config: RelayConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let source = Arc::new(RegistryClient::new(&config.router.registry_url));
    let router = RelayRouter::new(
        &config.router.name,
        source,
        CapabilityMatcher::from_config(&config.matcher),
    );

    let addr = bind_addr(&config.server.bind, config.router.port)?;
    info!("Agentrelay router '{}' v{} starting", config.router.name, env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", addr);
    info!("  Registry:     {}", config.router.registry_url);
    info!("  Min score:    {}", config.matcher.min_score);

    let listener = TcpListener::bind(addr).await?;
    serve(listener, agent_router(Arc::new(router)), cancel).await?;
    Ok(())
}
