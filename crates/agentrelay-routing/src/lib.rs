//! Agentrelay routing - capability matching, the router, and the multi-hop routing client

pub mod client;
pub mod handler;
pub mod matcher;
pub mod retry;
pub mod router;
pub mod transport;

pub use client::{ClientConfig, Completed, FailureReason, RoutingClient, RoutingFailure, Target};
pub use handler::MessageHandler;
pub use matcher::{CapabilityMatcher, KeywordScorer, Scorer, Selection};
pub use retry::{retry_async, retry_async_until, RetryPolicy, Retryable};
pub use router::{CandidateSource, Router};
pub use transport::{AgentTransport, HttpTransport, TransportError};
