//! Lease-aware directory over a registry store
//!
//! Both the agent and the MCP directory are thin wrappers around
//! [`Directory`], so register/renew/lookup/expiry behave identically for
//! every record kind. Liveness is decided here, never by the store.
//!
//! Expiry is lazy and active: any read that meets a dead record evicts it,
//! and [`Directory::sweep`] does the same for a whole namespace.

use crate::clock::Clock;
use crate::lease::{LeasePolicy, LeaseRecord};
use crate::store::{Expect, RegistryStore, Versioned};
use agentrelay_core::{Error, Result};
use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Directory<R: LeaseRecord> {
    store: Arc<dyn RegistryStore>,
    namespace: &'static str,
    policy: LeasePolicy,
    clock: Arc<dyn Clock>,
    write_attempts: u32,
    _record: PhantomData<fn() -> R>,
}

/// Outcome of reading one stored record.
enum Slot<R> {
    Live(R, u64),
    Dead(u64),
    Corrupt(u64),
}

impl<R: LeaseRecord> Directory<R> {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        namespace: &'static str,
        policy: LeasePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            namespace,
            policy,
            clock,
            write_attempts: 3,
            _record: PhantomData,
        }
    }

    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn policy(&self) -> LeasePolicy {
        self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert or fully replace the record under its name.
    ///
    /// The write is conditional on the version read just before it, so two
    /// racing registrations never interleave a read of one with a write of the
    /// other. A loser re-reads and tries again, up to `write_attempts` times.
    pub async fn register(&self, record: R) -> Result<R> {
        let name = record.name().to_string();
        let bytes = serde_json::to_vec(&record)?;
        let mut last_err = None;
        for attempt in 1..=self.write_attempts {
            let expect = match self.store.get(self.namespace, &name).await {
                Ok(existing) => Expect::Version(existing.version),
                Err(Error::NotFound(_)) => Expect::Absent,
                Err(e) => return Err(e),
            };
            match self.store.put(self.namespace, &name, bytes.clone(), expect).await {
                Ok(version) => {
                    info!("Registered {}/{} (v{})", self.namespace, name, version);
                    return Ok(record);
                }
                Err(e @ Error::VersionConflict { .. }) => {
                    debug!("Register {}/{} lost race (attempt {})", self.namespace, name, attempt);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::version_conflict(self.key(&name), None, None)))
    }

    /// Refresh the lease and merge `update` into the stored record.
    ///
    /// Fails with `NotRegistered` when the record is absent or its lease has
    /// already lapsed; a lapsed record is evicted on the way out.
    pub async fn renew(&self, name: &str, update: R::Update) -> Result<R> {
        let mut last_err = None;
        for attempt in 1..=self.write_attempts {
            let now = self.now();
            let (mut record, version) = match self.read(name, now).await? {
                Some(Slot::Live(record, version)) => (record, version),
                Some(Slot::Dead(version)) | Some(Slot::Corrupt(version)) => {
                    self.evict(name, version).await?;
                    return Err(Error::NotRegistered(name.to_string()));
                }
                None => return Err(Error::NotRegistered(name.to_string())),
            };
            record.merge(update.clone());
            record.heartbeat(now);
            let bytes = serde_json::to_vec(&record)?;
            match self.store.put(self.namespace, name, bytes, Expect::Version(version)).await {
                Ok(_) => {
                    debug!("Renewed {}/{}", self.namespace, name);
                    return Ok(record);
                }
                Err(e @ Error::VersionConflict { .. }) => {
                    debug!("Renew {}/{} lost race (attempt {})", self.namespace, name, attempt);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::version_conflict(self.key(name), None, None)))
    }

    /// The live record for `name`, or `NotFound`. Dead records are evicted.
    pub async fn get_live(&self, name: &str) -> Result<R> {
        match self.read(name, self.now()).await? {
            Some(Slot::Live(record, _)) => Ok(record),
            Some(Slot::Dead(version)) | Some(Slot::Corrupt(version)) => {
                self.evict(name, version).await?;
                Err(Error::NotFound(name.to_string()))
            }
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Every live record, ordered by name. Dead records met on the way are evicted.
    pub async fn live(&self) -> Result<Vec<R>> {
        let now = self.now();
        let mut live = Vec::new();
        for (key, stored) in self.store.scan(self.namespace).await? {
            match self.classify(&key, stored, now) {
                Slot::Live(record, _) => live.push(record),
                Slot::Dead(version) | Slot::Corrupt(version) => {
                    self.evict(&key, version).await?;
                }
            }
        }
        Ok(live)
    }

    /// Explicit removal. Returns whether a record was there; absent is not an error.
    pub async fn deregister(&self, name: &str) -> Result<bool> {
        match self.store.delete(self.namespace, name, Expect::Any).await {
            Ok(()) => {
                info!("Deregistered {}/{}", self.namespace, name);
                Ok(true)
            }
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete every record whose lease has lapsed. Returns how many were removed.
    pub async fn sweep(&self) -> Result<usize> {
        let now = self.now();
        let mut removed = 0;
        for (key, stored) in self.store.scan(self.namespace).await? {
            match self.classify(&key, stored, now) {
                Slot::Live(..) => {}
                Slot::Dead(version) | Slot::Corrupt(version) => {
                    if self.evict(&key, version).await? {
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            info!("Swept {} expired record(s) from {}", removed, self.namespace);
        }
        Ok(removed)
    }

    async fn read(&self, name: &str, now: DateTime<Utc>) -> Result<Option<Slot<R>>> {
        match self.store.get(self.namespace, name).await {
            Ok(stored) => Ok(Some(self.classify(name, stored, now))),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn classify(&self, key: &str, stored: Versioned, now: DateTime<Utc>) -> Slot<R> {
        match serde_json::from_slice::<R>(&stored.bytes) {
            Ok(record) if self.policy.is_live(&record, now) => Slot::Live(record, stored.version),
            Ok(_) => Slot::Dead(stored.version),
            Err(e) => {
                warn!("Corrupt record {}: {}", self.key(key), e);
                Slot::Corrupt(stored.version)
            }
        }
    }

    /// Remove a record only if it is still at the version we judged dead.
    /// A concurrent renewal or removal wins; that is not an error.
    async fn evict(&self, name: &str, version: u64) -> Result<bool> {
        match self.store.delete(self.namespace, name, Expect::Version(version)).await {
            Ok(()) => {
                debug!("Evicted {}", self.key(name));
                Ok(true)
            }
            Err(Error::NotFound(_)) | Err(Error::VersionConflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }
}
