//! In-process store, lives as long as the process

use super::{Expect, RegistryStore, Versioned};
use agentrelay_core::{Error, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

type RecordKey = (String, String);

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<RecordKey, Versioned>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn put(&self, namespace: &str, key: &str, bytes: Vec<u8>, expect: Expect) -> Result<u64> {
        // The entry guard holds the shard lock, so check-and-write is atomic.
        match self.records.entry((namespace.to_string(), key.to_string())) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().version;
                expect.check(namespace, key, Some(current))?;
                let version = current + 1;
                entry.insert(Versioned { version, bytes });
                Ok(version)
            }
            Entry::Vacant(entry) => {
                expect.check(namespace, key, None)?;
                entry.insert(Versioned { version: 1, bytes });
                Ok(1)
            }
        }
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Versioned> {
        self.records
            .get(&(namespace.to_string(), key.to_string()))
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<(String, Versioned)>> {
        let mut records: Vec<(String, Versioned)> = self
            .records
            .iter()
            .filter(|r| r.key().0 == namespace)
            .map(|r| (r.key().1.clone(), r.value().clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    async fn delete(&self, namespace: &str, key: &str, expect: Expect) -> Result<()> {
        match self.records.entry((namespace.to_string(), key.to_string())) {
            Entry::Occupied(entry) => {
                expect.check(namespace, key, Some(entry.get().version))?;
                entry.remove();
                Ok(())
            }
            Entry::Vacant(_) => Err(Error::NotFound(key.to_string())),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
