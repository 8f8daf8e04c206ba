//! Persistence traits for the identity storage abstraction layer
//!
//! Backends: process-local memory and external database (MySQL/PostgreSQL/SQLite).

pub mod identity;

pub use identity::IdentityPersistence;

use async_trait::async_trait;

use crate::model::PersistenceMode;

/// Unified persistence service trait
#[async_trait]
pub trait PersistenceService: IdentityPersistence + Send + Sync {
    /// Get the current persistence mode
    fn persistence_mode(&self) -> PersistenceMode;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;
}
