// Coordination store abstraction and in-memory backend
// The in-memory store keeps lock records in a DashMap with lazy and swept expiry

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tracing::debug;

use super::model::{LockRecord, LockToken};

/// Shared store offering the atomic primitives a distributed lock is built on
///
/// Every process instance that coordinates on the same keys must talk to the
/// same store. Implementations report transport or backend failures as errors;
/// a held key is not an error.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create a record for `key` holding `token` that expires after `ttl`,
    /// only if no live record exists. Returns whether the record was created.
    async fn put_if_absent(&self, key: &str, token: &LockToken, ttl: Duration)
    -> anyhow::Result<bool>;

    /// Delete the record for `key` only if it still holds `token`.
    /// Returns whether a record was deleted.
    async fn delete_if_match(&self, key: &str, token: &LockToken) -> anyhow::Result<bool>;

    /// Whether a live record currently exists for `key`
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Short backend name used in logs and metric labels
    fn backend(&self) -> &'static str;
}

/// In-memory coordination store using DashMap
///
/// Shared between callers through an `Arc`, the same way a client handle to an
/// external store would be. Expired records are ignored on read and replaced on
/// write; the optional sweeper only reclaims memory.
pub struct MemoryCoordinationStore {
    pub(crate) locks: Arc<DashMap<String, LockRecord>>,
    sweeper: Option<JoinHandle<()>>,
}

impl Default for MemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinationStore {
    /// Create a store without a background sweeper
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            sweeper: None,
        }
    }

    /// Create a store and start the background expiry task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_sweeper(interval: Duration) -> Self {
        let locks: Arc<DashMap<String, LockRecord>> = Arc::new(DashMap::new());

        let locks_clone = locks.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let swept = Self::sweep_expired(&locks_clone);
                if swept > 0 {
                    debug!(count = swept, "Cleaned up expired lock records");
                }
            }
        });

        Self {
            locks,
            sweeper: Some(handle),
        }
    }

    fn sweep_expired(locks: &DashMap<String, LockRecord>) -> usize {
        let before = locks.len();
        locks.retain(|_, record| !record.is_expired());
        before.saturating_sub(locks.len())
    }

    /// Remove every expired record now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        Self::sweep_expired(&self.locks)
    }

    /// Number of records held, live or not yet swept
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for MemoryCoordinationStore {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn put_if_absent(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        let Some(record) = LockRecord::new(key, token.clone(), ttl) else {
            anyhow::bail!("lease of {:?} for lock '{}' is out of range", ttl, key);
        };

        // The entry guard holds the shard write lock, making check-and-insert atomic
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return Ok(false);
                }
                occupied.insert(record);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(true)
            }
        }
    }

    async fn delete_if_match(&self, key: &str, token: &LockToken) -> anyhow::Result<bool> {
        Ok(self
            .locks
            .remove_if(key, |_, record| record.is_owned_by(token.as_str()))
            .is_some())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self
            .locks
            .get(key)
            .is_some_and(|record| !record.is_expired()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
