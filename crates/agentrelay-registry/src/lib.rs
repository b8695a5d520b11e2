//! Agentrelay registry - agent and MCP directories with lease-based liveness

pub mod agents;
pub mod clock;
pub mod directory;
pub mod lease;
pub mod mcp;
pub mod store;
pub mod sweeper;

pub use agents::AgentDirectory;
pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::Directory;
pub use lease::{LeasePolicy, LeaseRecord};
pub use mcp::McpDirectory;
pub use store::{Expect, RegistryStore, Versioned};
pub use sweeper::{spawn_sweeper, Sweep};

/// Store namespace holding agent cards.
pub const AGENTS_NAMESPACE: &str = "agents";
/// Store namespace holding MCP server cards.
pub const MCP_NAMESPACE: &str = "mcp";
/// Store namespace holding per-server agent grants.
pub const MCP_GRANTS_NAMESPACE: &str = "mcp-grants";
