//! Error types for Agentrelay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not registered: {0}")]
    NotRegistered(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict on {key}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        key: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("invalid card: {0}")]
    InvalidCard(String),

    #[error("no route: {0}")]
    NoRoute(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn version_conflict(key: impl Into<String>, expected: Option<u64>, actual: Option<u64>) -> Self {
        Self::VersionConflict {
            key: key.into(),
            expected,
            actual,
        }
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Stable machine-readable code, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotRegistered(_) => "not-registered",
            Self::NotFound(_) => "not-found",
            Self::VersionConflict { .. } => "conflict",
            Self::InvalidCard(_) => "invalid-card",
            Self::NoRoute(_) => "no-route",
            Self::Storage(_) => "storage",
            Self::Http(_) => "http",
            Self::ConfigError(_) => "config",
            Self::IoError(_) => "io",
            Self::JsonError(_) => "json",
            Self::Internal(_) => "internal",
        }
    }

    /// Directory/store errors that a caller can recover from by retrying or re-registering.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered(_) | Self::NotFound(_) | Self::VersionConflict { .. }
        )
    }
}
