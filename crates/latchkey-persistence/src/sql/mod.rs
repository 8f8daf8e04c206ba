//! SQL-based persistence backend (MySQL/PostgreSQL/SQLite via SeaORM)
//!
//! Identities live in the `identity_user` table, which carries a unique index
//! on `external_id`. A violation of that index is reported as
//! `LatchkeyError::DuplicateExternalId`.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{prelude::Expr, *};
use tracing::{debug, info};

use latchkey_common::LatchkeyError;

use crate::entity::identity_user;
use crate::model::{IdentityRecord, PersistenceMode};
use crate::traits::{IdentityPersistence, PersistenceService};

/// External database persistence service
///
/// Wraps a SeaORM `DatabaseConnection` and implements the persistence traits
/// with direct queries against `identity_user`.
pub struct ExternalDbPersistService {
    db: DatabaseConnection,
}

impl ExternalDbPersistService {
    /// Create a new ExternalDbPersistService with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the `identity_user` table and its unique index if missing
    pub async fn create_schema(&self) -> anyhow::Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(identity_user::Entity);
        table.if_not_exists();
        self.db.execute(backend.build(&table)).await?;

        info!(backend = ?backend, "Identity schema ready");
        Ok(())
    }
}

impl From<identity_user::Model> for IdentityRecord {
    fn from(m: identity_user::Model) -> Self {
        Self {
            id: m.id,
            external_id: m.external_id,
            created_at: m.created_at,
        }
    }
}

fn map_insert_error(err: DbErr, external_id: &str) -> anyhow::Error {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            LatchkeyError::DuplicateExternalId(external_id.to_string()).into()
        }
        _ => err.into(),
    }
}

#[async_trait]
impl PersistenceService for ExternalDbPersistService {
    fn persistence_mode(&self) -> PersistenceMode {
        PersistenceMode::Sql
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        // Execute a simple query to verify connectivity
        identity_user::Entity::find()
            .select_only()
            .column_as(Expr::cust("1"), "health")
            .into_tuple::<i32>()
            .one(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityPersistence for ExternalDbPersistService {
    async fn identity_find_by_external_id(
        &self,
        external_id: &str,
    ) -> anyhow::Result<Option<IdentityRecord>> {
        let record = identity_user::Entity::find()
            .filter(identity_user::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?
            .map(IdentityRecord::from);

        Ok(record)
    }

    async fn identity_insert(&self, external_id: &str) -> anyhow::Result<IdentityRecord> {
        let entity = identity_user::ActiveModel {
            external_id: Set(external_id.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let model = entity
            .insert(&self.db)
            .await
            .map_err(|e| map_insert_error(e, external_id))?;

        debug!(external_id = %external_id, id = model.id, "Identity inserted");
        Ok(model.into())
    }

    async fn identity_count(&self) -> anyhow::Result<u64> {
        let count = identity_user::Entity::find().count(&self.db).await?;
        Ok(count)
    }
}
