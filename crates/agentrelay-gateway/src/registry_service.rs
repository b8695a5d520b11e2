//! Registry HTTP service
//!
//! ```text
//! POST   /agents/register                 AgentRegistration -> AgentCard
//! POST   /agents/renew                    RenewRequest      -> AgentCard
//! GET    /agents/lookup?name=|capability= -> AgentCard | [AgentCard]
//! GET    /agents                          -> [AgentCard]
//! DELETE /agents/deregister?name=
//! POST   /mcp/register                    McpRegistration   -> McpCard
//! POST   /mcp/renew                       McpRenewRequest   -> McpCard
//! GET    /mcp/lookup?name=                -> McpCard
//! GET    /mcp/servers                     -> [McpCard]
//! DELETE /mcp/deregister?name=
//! PUT    /mcp/:server/agents/:agent       grant
//! DELETE /mcp/:server/agents/:agent       revoke
//! GET    /mcp/:server/agents              -> [name]
//! GET    /mcp/agent/:agent/servers        -> [McpCard]
//! GET    /health
//! ```

use crate::error::ApiError;
use agentrelay_core::{AgentRegistration, McpRegistration, McpRenewRequest, RenewRequest};
use agentrelay_registry::{AgentDirectory, McpDirectory};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct RegistryState {
    pub agents: Arc<AgentDirectory>,
    pub mcp: Arc<McpDirectory>,
    pub backend: &'static str,
    pub started_at: Instant,
}

impl RegistryState {
    pub fn new(agents: Arc<AgentDirectory>, mcp: Arc<McpDirectory>, backend: &'static str) -> Self {
        Self {
            agents,
            mcp,
            backend,
            started_at: Instant::now(),
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub name: Option<String>,
    pub capability: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameParams {
    pub name: String,
}

pub fn registry_router(state: Arc<RegistryState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/agents", get(list_agents))
        .route("/agents/register", post(register_agent))
        .route("/agents/renew", post(renew_agent))
        .route("/agents/lookup", get(lookup_agent))
        .route("/agents/deregister", axum::routing::delete(deregister_agent))
        .route("/mcp/servers", get(list_mcp))
        .route("/mcp/register", post(register_mcp))
        .route("/mcp/renew", post(renew_mcp))
        .route("/mcp/lookup", get(lookup_mcp))
        .route("/mcp/deregister", axum::routing::delete(deregister_mcp))
        .route("/mcp/:server/agents", get(allowed_agents))
        .route("/mcp/:server/agents/:agent", put(grant).delete(revoke))
        .route("/mcp/agent/:agent/servers", get(servers_for_agent))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<RegistryState>>) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.backend,
        "agents": state.agents.list().await?.len(),
        "mcpServers": state.mcp.list().await?.len(),
        "leaseTtlSecs": state.agents.lease_ttl().as_secs(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    })))
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

async fn register_agent(
    State(state): State<Arc<RegistryState>>,
    Json(registration): Json<AgentRegistration>,
) -> ApiResult<Response> {
    Ok(Json(state.agents.register(registration).await?).into_response())
}

async fn renew_agent(
    State(state): State<Arc<RegistryState>>,
    Json(request): Json<RenewRequest>,
) -> ApiResult<Response> {
    Ok(Json(state.agents.renew(&request.name, request.update).await?).into_response())
}

async fn lookup_agent(
    State(state): State<Arc<RegistryState>>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Response> {
    match params.name {
        Some(name) => Ok(Json(state.agents.lookup_by_name(&name).await?).into_response()),
        None => Ok(Json(
            state
                .agents
                .lookup_by_capability(params.capability.as_deref())
                .await?,
        )
        .into_response()),
    }
}

async fn list_agents(State(state): State<Arc<RegistryState>>) -> ApiResult<Response> {
    Ok(Json(state.agents.list().await?).into_response())
}

async fn deregister_agent(
    State(state): State<Arc<RegistryState>>,
    Query(params): Query<NameParams>,
) -> ApiResult<Response> {
    let removed = state.agents.deregister(&params.name).await?;
    Ok(Json(serde_json::json!({ "name": params.name, "removed": removed })).into_response())
}

// ---------------------------------------------------------------------------
// MCP servers
// ---------------------------------------------------------------------------

async fn register_mcp(
    State(state): State<Arc<RegistryState>>,
    Json(registration): Json<McpRegistration>,
) -> ApiResult<Response> {
    Ok(Json(state.mcp.register(registration).await?).into_response())
}

async fn renew_mcp(
    State(state): State<Arc<RegistryState>>,
    Json(request): Json<McpRenewRequest>,
) -> ApiResult<Response> {
    Ok(Json(state.mcp.renew(&request.name, request.update).await?).into_response())
}

async fn lookup_mcp(
    State(state): State<Arc<RegistryState>>,
    Query(params): Query<NameParams>,
) -> ApiResult<Response> {
    Ok(Json(state.mcp.lookup(&params.name).await?).into_response())
}

async fn list_mcp(State(state): State<Arc<RegistryState>>) -> ApiResult<Response> {
    Ok(Json(state.mcp.list().await?).into_response())
}

async fn deregister_mcp(
    State(state): State<Arc<RegistryState>>,
    Query(params): Query<NameParams>,
) -> ApiResult<Response> {
    let removed = state.mcp.deregister(&params.name).await?;
    Ok(Json(serde_json::json!({ "name": params.name, "removed": removed })).into_response())
}

async fn grant(
    State(state): State<Arc<RegistryState>>,
    Path((server, agent)): Path<(String, String)>,
) -> ApiResult<Response> {
    state.mcp.grant(&server, &agent).await?;
    Ok(Json(serde_json::json!({ "server": server, "agent": agent, "granted": true })).into_response())
}

async fn revoke(
    State(state): State<Arc<RegistryState>>,
    Path((server, agent)): Path<(String, String)>,
) -> ApiResult<Response> {
    let removed = state.mcp.revoke(&server, &agent).await?;
    Ok(Json(serde_json::json!({ "server": server, "agent": agent, "removed": removed })).into_response())
}

async fn allowed_agents(
    State(state): State<Arc<RegistryState>>,
    Path(server): Path<String>,
) -> ApiResult<Response> {
    Ok(Json(state.mcp.allowed_agents(&server).await?).into_response())
}

async fn servers_for_agent(
    State(state): State<Arc<RegistryState>>,
    Path(agent): Path<String>,
) -> ApiResult<Response> {
    Ok(Json(state.mcp.servers_for_agent(&agent).await?).into_response())
}
