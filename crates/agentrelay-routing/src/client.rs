//! Multi-hop routing client
//!
//! Sends a task to a starting target and follows handover suggestions until
//! an agent answers or the run fails. Each send appends the target to
//! `visited`; a suggestion naming an already visited agent is a loop, and no
//! further hop is taken once `max_hops` sends have been made. Both checks
//! together bound every run.
//!
//! Cancellation is observed at hop boundaries and between retries: an
//! in-flight send is allowed to finish, and its result is discarded; a
//! pending backoff is abandoned. The chain deadline is not so
//! polite and drops whatever is in flight.

use crate::retry::{retry_async_until, RetryPolicy};
use crate::transport::{AgentTransport, HttpTransport, TransportError};
use agentrelay_core::config::{RetryConfig, RoutingConfig};
use agentrelay_core::{AgentCard, ContextId, MessageRequest, RoutingOutcome, Task};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub max_hops: u32,
    pub hop_timeout: Duration,
    pub chain_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&RoutingConfig::default())
    }
}

impl From<&RoutingConfig> for ClientConfig {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            max_hops: config.max_hops,
            hop_timeout: config.hop_timeout(),
            chain_timeout: config.chain_timeout(),
            retry: config.retry.clone(),
        }
    }
}

/// Where to send the next hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub endpoint: String,
}

impl Target {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl From<AgentCard> for Target {
    fn from(card: AgentCard) -> Self {
        Self {
            name: card.name,
            endpoint: card.endpoint,
        }
    }
}

/// A run that ended with an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub context_id: ContextId,
    pub answer: String,
    pub visited: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NoRoute,
    LoopDetected,
    HopLimitExceeded,
    TargetUnreachable,
    ProtocolError,
    ChainTimeout,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRoute => "no-route",
            Self::LoopDetected => "loop-detected",
            Self::HopLimitExceeded => "hop-limit-exceeded",
            Self::TargetUnreachable => "target-unreachable",
            Self::ProtocolError => "protocol-error",
            Self::ChainTimeout => "chain-timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a run. Always carries the full chain of visited agents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("routing {context_id} failed ({reason}) after {visited:?}: {detail}")]
pub struct RoutingFailure {
    pub reason: FailureReason,
    pub context_id: ContextId,
    pub visited: Vec<String>,
    pub detail: String,
}

type Step = std::result::Result<String, (FailureReason, String)>;

pub struct RoutingClient {
    transport: Arc<dyn AgentTransport>,
    config: ClientConfig,
}

impl RoutingClient {
    pub fn new(transport: Arc<dyn AgentTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn http(config: ClientConfig) -> Self {
        Self::new(Arc::new(HttpTransport::new()), config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn send(&self, start: Target, task: Task) -> Result<Completed, RoutingFailure> {
        self.send_cancellable(start, task, CancellationToken::new()).await
    }

    pub async fn send_cancellable(
        &self,
        start: Target,
        mut task: Task,
        cancel: CancellationToken,
    ) -> Result<Completed, RoutingFailure> {
        let deadline = Instant::now() + self.config.chain_timeout;
        let step = match tokio::time::timeout_at(deadline, self.run(start, &mut task, &cancel)).await {
            Ok(step) => step,
            Err(_) => Err((
                FailureReason::ChainTimeout,
                format!("chain exceeded {:?}", self.config.chain_timeout),
            )),
        };

        let context_id = task.context_id().clone();
        match step {
            Ok(answer) => {
                info!("Routing {} done after {} hop(s)", context_id, task.hop_count());
                Ok(Completed {
                    context_id,
                    answer,
                    visited: task.into_visited(),
                })
            }
            Err((reason, detail)) => {
                warn!("Routing {} failed: {} ({})", context_id, reason, detail);
                Err(RoutingFailure {
                    reason,
                    context_id,
                    visited: task.into_visited(),
                    detail,
                })
            }
        }
    }

    async fn run(&self, start: Target, task: &mut Task, cancel: &CancellationToken) -> Step {
        let mut target = start;
        loop {
            if cancel.is_cancelled() {
                return Err((FailureReason::Cancelled, "cancelled by caller".into()));
            }
            if target.name.trim().is_empty() || target.endpoint.trim().is_empty() {
                return Err((
                    FailureReason::ProtocolError,
                    format!("target without name or endpoint: {:?}", target),
                ));
            }

            task.visit(target.name.clone());
            let request = MessageRequest::from(&*task);
            debug!(
                "Hop {} of {}: sending to {} at {}",
                task.hop_count(),
                task.context_id(),
                target.name,
                target.endpoint
            );

            let mut policy = RetryPolicy::new(self.config.retry.clone());
            let result =
                retry_async_until(|| self.attempt(&target.endpoint, &request), &mut policy, cancel).await;

            if cancel.is_cancelled() {
                return Err((FailureReason::Cancelled, format!("cancelled while {} was answering", target.name)));
            }

            let card = match result {
                Ok(RoutingOutcome::FinalAnswer { content }) => return Ok(content),
                Ok(RoutingOutcome::NoRoute) => {
                    return Err((FailureReason::NoRoute, format!("{} found no suitable agent", target.name)));
                }
                Ok(RoutingOutcome::HandoverSuggestion { card }) => card,
                Err(e) if e.is_retryable() => {
                    return Err((FailureReason::TargetUnreachable, format!("{}: {}", target.name, e)));
                }
                Err(e) => {
                    return Err((FailureReason::ProtocolError, format!("{}: {}", target.name, e)));
                }
            };

            if card.name.trim().is_empty() || card.endpoint.trim().is_empty() {
                return Err((
                    FailureReason::ProtocolError,
                    format!("{} suggested a card without name or endpoint", target.name),
                ));
            }
            if task.has_visited(&card.name) {
                return Err((
                    FailureReason::LoopDetected,
                    format!("{} suggested {}, already visited", target.name, card.name),
                ));
            }
            if task.hop_count() >= self.config.max_hops {
                return Err((
                    FailureReason::HopLimitExceeded,
                    format!("{} suggested {} after {} hop(s)", target.name, card.name, task.hop_count()),
                ));
            }

            info!("Handover {}: {} -> {}", task.context_id(), target.name, card.name);
            target = Target::from(card);
        }
    }

    async fn attempt(&self, endpoint: &str, request: &MessageRequest) -> Result<RoutingOutcome, TransportError> {
        match tokio::time::timeout(self.config.hop_timeout, self.transport.send(endpoint, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.config.hop_timeout)),
        }
    }
}
