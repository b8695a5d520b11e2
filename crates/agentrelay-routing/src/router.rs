//! Registry-aware router
//!
//! Never answers a task itself. It looks up live candidates, drops the ones
//! the conversation already visited, and either suggests the best match or
//! reports no-route.

use crate::handler::MessageHandler;
use crate::matcher::{CapabilityMatcher, Selection};
use agentrelay_core::{AgentCard, MessageRequest, Result, RoutingOutcome};
use agentrelay_registry::AgentDirectory;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the router gets its live candidates from.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Live cards carrying `capability`, or every live card when `None`.
    async fn candidates(&self, capability: Option<&str>) -> Result<Vec<AgentCard>>;
}

#[async_trait]
impl CandidateSource for AgentDirectory {
    async fn candidates(&self, capability: Option<&str>) -> Result<Vec<AgentCard>> {
        self.lookup_by_capability(capability).await
    }
}

pub struct Router {
    name: String,
    source: Arc<dyn CandidateSource>,
    matcher: CapabilityMatcher,
}

impl Router {
    pub fn new(name: impl Into<String>, source: Arc<dyn CandidateSource>, matcher: CapabilityMatcher) -> Self {
        Self {
            name: name.into(),
            source,
            matcher,
        }
    }

    pub async fn route(&self, request: &MessageRequest) -> Result<RoutingOutcome> {
        let hint = request.capability_hint.as_deref();
        let candidates: Vec<AgentCard> = self
            .source
            .candidates(hint)
            .await?
            .into_iter()
            .filter(|card| card.name != self.name && !request.visited.contains(&card.name))
            .collect();

        let description = match hint {
            Some(hint) => format!("{} {}", hint, request.payload),
            None => request.payload.clone(),
        };
        debug!(
            "Routing {} over {} candidate(s) (hint: {:?})",
            request.context_id,
            candidates.len(),
            hint
        );

        match self.matcher.select_with_hint(hint, &description, &candidates) {
            Selection::Selected(card) => {
                info!("Routing {} -> {}", request.context_id, card.name);
                Ok(RoutingOutcome::handover(card))
            }
            Selection::NoMatch => {
                info!("No route for {}", request.context_id);
                Ok(RoutingOutcome::NoRoute)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Router {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, request: MessageRequest) -> Result<RoutingOutcome> {
        self.route(&request).await
    }
}
