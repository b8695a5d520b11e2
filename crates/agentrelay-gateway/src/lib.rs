//! Agentrelay Gateway - HTTP services for the registry and for message handlers

pub mod agent_service;
pub mod error;
pub mod heartbeat;
pub mod registry_client;
pub mod registry_service;
pub mod server;

pub use agent_service::agent_router;
pub use error::ApiError;
pub use heartbeat::{spawn_heartbeat, Registrar};
pub use registry_client::RegistryClient;
pub use registry_service::{registry_router, RegistryState};
pub use server::{serve, start_registry, start_router};
