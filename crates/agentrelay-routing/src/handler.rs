//! The contract every message-serving agent implements

use agentrelay_core::{MessageRequest, Result, RoutingOutcome};
use async_trait::async_trait;

/// Answers a message with a final answer, a handover, or no-route.
///
/// How an agent decides its own answer is up to the implementation; the
/// gateway serves any handler at `POST /message`.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, request: MessageRequest) -> Result<RoutingOutcome>;
}
