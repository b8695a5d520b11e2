//! Message service: serves any `MessageHandler` at `POST /message`

use crate::error::ApiError;
use agentrelay_core::{MessageRequest, RoutingOutcome};
use agentrelay_routing::MessageHandler;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub fn agent_router(handler: Arc<dyn MessageHandler>) -> Router {
    Router::new()
        .route("/message", post(message_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(handler)
}

async fn message_handler(
    State(handler): State<Arc<dyn MessageHandler>>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<RoutingOutcome>, ApiError> {
    debug!(
        "{} received {} (hop {:?})",
        handler.name(),
        request.context_id,
        request.hop_hint
    );
    Ok(Json(handler.handle(request).await?))
}

async fn health_handler(State(handler): State<Arc<dyn MessageHandler>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "agent": handler.name(),
    }))
}
