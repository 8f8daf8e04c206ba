//! Service wiring
//!
//! Builds the coordination store, persistence backend and identity service
//! selected by configuration.

use std::sync::Arc;

use tracing::info;

use latchkey_auth::IdentityService;
use latchkey_consistency::{CoordinationStore, DistributedLock, MemoryCoordinationStore};
use latchkey_persistence::{
    ExternalDbPersistService, IdentityPersistence, MemoryPersistService, PersistenceMode,
    PersistenceService,
};

use crate::model::config::{CoordinationBackend, Configuration};

/// Shared services for one process
#[derive(Clone)]
pub struct AppContext {
    pub identity: Arc<IdentityService>,
    pub persistence: Arc<dyn IdentityPersistence>,
    pub lock: DistributedLock,
}

impl AppContext {
    /// Wire services from explicit parts
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        persistence: Arc<dyn IdentityPersistence>,
        configuration: &Configuration,
    ) -> anyhow::Result<Self> {
        let lock = DistributedLock::new(store);
        let identity = Arc::new(IdentityService::new(
            persistence.clone(),
            lock.clone(),
            configuration.lock_execute_options()?,
        ));

        Ok(Self {
            identity,
            persistence,
            lock,
        })
    }

    /// Wire services from configuration, connecting to external stores as needed
    pub async fn from_configuration(configuration: &Configuration) -> anyhow::Result<Self> {
        let store = coordination_store(configuration).await?;
        let persistence = persistence_service(configuration).await?;
        Self::new(store, persistence, configuration)
    }
}

pub async fn coordination_store(
    configuration: &Configuration,
) -> anyhow::Result<Arc<dyn CoordinationStore>> {
    let backend = configuration.coordination_backend()?;
    info!(backend = %backend, "Coordination store backend");

    match backend {
        CoordinationBackend::Memory => Ok(Arc::new(MemoryCoordinationStore::with_sweeper(
            configuration.sweep_interval()?,
        ))),
        CoordinationBackend::Redis => redis_store(configuration).await,
    }
}

#[cfg(feature = "redis")]
async fn redis_store(configuration: &Configuration) -> anyhow::Result<Arc<dyn CoordinationStore>> {
    let store = latchkey_consistency::RedisCoordinationStore::connect(&configuration.redis_url()).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn redis_store(_configuration: &Configuration) -> anyhow::Result<Arc<dyn CoordinationStore>> {
    anyhow::bail!("redis coordination backend requires building with the `redis` feature")
}

pub async fn persistence_service(
    configuration: &Configuration,
) -> anyhow::Result<Arc<dyn IdentityPersistence>> {
    let mode = configuration.persistence_mode()?;
    info!("Persistence mode: {}", mode);

    match mode {
        PersistenceMode::Memory => {
            let service = MemoryPersistService::new()
                .with_unique_constraint(configuration.memory_unique_external_id())
                .with_latency(configuration.memory_latency()?);
            Ok(Arc::new(service))
        }
        PersistenceMode::Sql => {
            let db = configuration.database_connection().await?;
            let service = ExternalDbPersistService::new(db);
            service.create_schema().await?;
            service.health_check().await?;
            Ok(Arc::new(service))
        }
    }
}
