//! In-memory persistence backend
//!
//! Keeps identity records in DashMaps. Uniqueness of `external_id` is only
//! enforced when requested, so the backend can stand in both for a table with
//! a unique index and for one without.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use latchkey_common::LatchkeyError;

use crate::model::{IdentityRecord, PersistenceMode};
use crate::traits::{IdentityPersistence, PersistenceService};

/// Process-local persistence service
pub struct MemoryPersistService {
    records: DashMap<i64, IdentityRecord>,
    // external id -> id of the first record created for it
    by_external_id: DashMap<String, i64>,
    next_id: AtomicI64,
    inserts: AtomicU64,
    unique_external_id: bool,
    latency: Duration,
}

impl Default for MemoryPersistService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPersistService {
    /// Create an empty store that enforces unique external ids
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            by_external_id: DashMap::new(),
            next_id: AtomicI64::new(1),
            inserts: AtomicU64::new(0),
            unique_external_id: true,
            latency: Duration::ZERO,
        }
    }

    /// Toggle the unique constraint on `external_id`
    pub fn with_unique_constraint(mut self, enabled: bool) -> Self {
        self.unique_external_id = enabled;
        self
    }

    /// Delay every lookup and insert, simulating a remote round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of successful inserts since creation
    pub fn insert_count(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// All records stored for `external_id`, ordered by id
    pub fn records_for(&self, external_id: &str) -> Vec<IdentityRecord> {
        let mut found: Vec<IdentityRecord> = self
            .records
            .iter()
            .filter(|r| r.external_id == external_id)
            .map(|r| r.value().clone())
            .collect();
        found.sort_by_key(|r| r.id);
        found
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn allocate(&self, external_id: &str) -> IdentityRecord {
        IdentityRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            external_id: external_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PersistenceService for MemoryPersistService {
    fn persistence_mode(&self) -> PersistenceMode {
        PersistenceMode::Memory
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl IdentityPersistence for MemoryPersistService {
    async fn identity_find_by_external_id(
        &self,
        external_id: &str,
    ) -> anyhow::Result<Option<IdentityRecord>> {
        self.round_trip().await;

        let record = self
            .by_external_id
            .get(external_id)
            .and_then(|id| self.records.get(id.value()).map(|r| r.value().clone()));

        Ok(record)
    }

    async fn identity_insert(&self, external_id: &str) -> anyhow::Result<IdentityRecord> {
        self.round_trip().await;

        let record = match self.by_external_id.entry(external_id.to_string()) {
            Entry::Occupied(_) if self.unique_external_id => {
                return Err(LatchkeyError::DuplicateExternalId(external_id.to_string()).into());
            }
            Entry::Occupied(_) => {
                let record = self.allocate(external_id);
                self.records.insert(record.id, record.clone());
                record
            }
            Entry::Vacant(vacant) => {
                let record = self.allocate(external_id);
                // Record first, then index, while the shard lock is still held
                self.records.insert(record.id, record.clone());
                vacant.insert(record.id);
                record
            }
        };

        self.inserts.fetch_add(1, Ordering::Relaxed);
        debug!(external_id = %external_id, id = record.id, "Identity inserted");

        Ok(record)
    }

    async fn identity_count(&self) -> anyhow::Result<u64> {
        Ok(self.records.len() as u64)
    }
}
