//! Registry store - versioned key/value records with conditional writes
//!
//! The store holds opaque record bytes per `(namespace, key)`. Every write bumps
//! the record's version; callers that read-modify-write pass the version they
//! read back as an [`Expect`] so a concurrent writer is detected instead of
//! silently overwritten. Liveness is not the store's concern.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use agentrelay_core::{Error, Result};
use async_trait::async_trait;

/// Precondition attached to a write or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Unconditional.
    Any,
    /// The key must not exist yet.
    Absent,
    /// The key must exist at exactly this version.
    Version(u64),
}

impl Expect {
    /// Check the precondition against the version currently stored.
    pub fn check(self, namespace: &str, key: &str, current: Option<u64>) -> Result<()> {
        let ok = match self {
            Expect::Any => true,
            Expect::Absent => current.is_none(),
            Expect::Version(v) => current == Some(v),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::version_conflict(
                format!("{}/{}", namespace, key),
                self.expected(),
                current,
            ))
        }
    }

    fn expected(self) -> Option<u64> {
        match self {
            Expect::Version(v) => Some(v),
            Expect::Any | Expect::Absent => None,
        }
    }
}

/// A record as stored, with the version it was written at. Versions start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Write `bytes` under `(namespace, key)` if `expect` holds. Returns the new version.
    async fn put(&self, namespace: &str, key: &str, bytes: Vec<u8>, expect: Expect) -> Result<u64>;

    /// `Error::NotFound` when the key is absent.
    async fn get(&self, namespace: &str, key: &str) -> Result<Versioned>;

    /// All records in a namespace, ordered by key.
    async fn scan(&self, namespace: &str) -> Result<Vec<(String, Versioned)>>;

    /// `Error::NotFound` when the key is absent.
    async fn delete(&self, namespace: &str, key: &str, expect: Expect) -> Result<()>;

    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_any_always_holds() {
        assert!(Expect::Any.check("ns", "k", None).is_ok());
        assert!(Expect::Any.check("ns", "k", Some(4)).is_ok());
    }

    #[test]
    fn expect_absent_rejects_existing() {
        let err = Expect::Absent.check("agents", "a", Some(2)).unwrap_err();
        match err {
            Error::VersionConflict { key, expected, actual } => {
                assert_eq!(key, "agents/a");
                assert_eq!(expected, None);
                assert_eq!(actual, Some(2));
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn expect_version_requires_exact_match() {
        assert!(Expect::Version(3).check("ns", "k", Some(3)).is_ok());
        assert!(Expect::Version(3).check("ns", "k", Some(4)).is_err());
        assert!(Expect::Version(3).check("ns", "k", None).is_err());
    }
}
