//! Relay configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration shared by the registry, router, and client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub routing: RoutingConfig,
    pub matcher: MatcherConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: BindMode,
}

/// Bind mode for HTTP services
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seconds after the last heartbeat at which a card stops being live.
    pub lease_ttl_secs: u64,
    /// Active sweep period. `None` leaves expiry to lookups alone.
    pub sweep_interval_secs: Option<u64>,
    /// Attempts at a compare-and-swap write before giving up with a version conflict.
    pub write_attempts: u32,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the sqlite backend.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Ceiling on sends per conversation.
    pub max_hops: u32,
    pub hop_timeout_ms: u64,
    /// Wall-clock ceiling on a whole handover chain.
    pub chain_timeout_ms: u64,
    pub retry: RetryConfig,
}

/// Bounded exponential backoff against a single target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates scoring below this are never selected.
    pub min_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    pub name: String,
    pub port: u16,
    pub registry_url: String,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8082,
            bind: BindMode::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: 30,
            sweep_interval_secs: Some(30),
            write_attempts: 3,
            store: StoreConfig::default(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_hops: 5,
            hop_timeout_ms: 30_000,
            chain_timeout_ms: 120_000,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { min_score: 0.1 }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "router".into(),
            port: 8083,
            registry_url: "http://127.0.0.1:8082".into(),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl RelayConfig {
    /// Load config from a TOML file. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)
                    .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.routing.max_hops == 0 {
            return Err(Error::ConfigError("routing.max_hops must be at least 1".into()));
        }
        if self.registry.lease_ttl_secs == 0 {
            return Err(Error::ConfigError("registry.lease_ttl_secs must be at least 1".into()));
        }
        if self.registry.sweep_interval_secs == Some(0) {
            return Err(Error::ConfigError(
                "registry.sweep_interval_secs must be at least 1 (omit it to disable the sweep)".into(),
            ));
        }
        if self.registry.write_attempts == 0 {
            return Err(Error::ConfigError("registry.write_attempts must be at least 1".into()));
        }
        if self.routing.hop_timeout_ms == 0 {
            return Err(Error::ConfigError("routing.hop_timeout_ms must be at least 1".into()));
        }
        if self.routing.chain_timeout_ms == 0 {
            return Err(Error::ConfigError("routing.chain_timeout_ms must be at least 1".into()));
        }
        if !(self.routing.retry.multiplier >= 1.0) {
            return Err(Error::ConfigError("routing.retry.multiplier must be at least 1.0".into()));
        }
        if !(self.matcher.min_score >= 0.0) {
            return Err(Error::ConfigError("matcher.min_score must be non-negative".into()));
        }
        if self.registry.store.backend == StoreBackend::Sqlite && self.registry.store.path.is_none() {
            return Err(Error::ConfigError("registry.store.path is required for the sqlite backend".into()));
        }
        Ok(())
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

impl RegistryConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Agents renew at a third of the lease so a single lost heartbeat never expires them.
    pub fn heartbeat_interval(&self) -> Duration {
        self.lease_ttl() / 3
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

impl RoutingConfig {
    pub fn hop_timeout(&self) -> Duration {
        Duration::from_millis(self.hop_timeout_ms)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_millis(self.chain_timeout_ms)
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}
