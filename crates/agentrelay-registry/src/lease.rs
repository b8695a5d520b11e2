//! Lease policy shared by every directory
//!
//! A record is live iff `now - last_heartbeat_at < ttl`. At exactly `ttl` it is dead.

use agentrelay_core::{AgentCard, CardUpdate, McpCard, McpUpdate};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// A directory record that carries a lease.
pub trait LeaseRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Optional field changes carried by a renewal.
    type Update: Clone + Send;

    fn name(&self) -> &str;
    fn registered_at(&self) -> DateTime<Utc>;
    fn last_heartbeat_at(&self) -> DateTime<Utc>;
    fn set_last_heartbeat_at(&mut self, at: DateTime<Utc>);

    /// Apply provided fields; absent fields stay as they are.
    fn merge(&mut self, update: Self::Update);

    /// Refresh the lease. Never moves the heartbeat before the registration.
    fn heartbeat(&mut self, now: DateTime<Utc>) {
        let at = now.max(self.registered_at());
        self.set_last_heartbeat_at(at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    ttl: Duration,
}

impl LeasePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_live<R: LeaseRecord>(&self, record: &R, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(record.last_heartbeat_at()).to_std() {
            Ok(elapsed) => elapsed < self.ttl,
            // Heartbeat stamped ahead of our clock.
            Err(_) => true,
        }
    }
}

impl LeaseRecord for AgentCard {
    type Update = CardUpdate;

    fn name(&self) -> &str {
        &self.name
    }

    fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    fn last_heartbeat_at(&self) -> DateTime<Utc> {
        self.last_heartbeat_at
    }

    fn set_last_heartbeat_at(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat_at = at;
    }

    fn merge(&mut self, update: CardUpdate) {
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(version) = update.version {
            self.version = version;
        }
        if let Some(endpoint) = update.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(capabilities) = update.capabilities {
            self.capabilities = capabilities;
        }
    }
}

impl LeaseRecord for McpCard {
    type Update = McpUpdate;

    fn name(&self) -> &str {
        &self.name
    }

    fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    fn last_heartbeat_at(&self) -> DateTime<Utc> {
        self.last_heartbeat_at
    }

    fn set_last_heartbeat_at(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat_at = at;
    }

    fn merge(&mut self, update: McpUpdate) {
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(endpoint) = update.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(protocol) = update.protocol {
            self.protocol = protocol;
        }
    }
}
