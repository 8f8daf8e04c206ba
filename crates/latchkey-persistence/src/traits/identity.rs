//! Identity persistence trait
//!
//! Defines the lookup and insert operations identity resolution is built on.

use async_trait::async_trait;

use crate::model::IdentityRecord;

/// Identity record persistence operations
///
/// Backends that enforce uniqueness of `external_id` report a conflicting
/// insert as [`latchkey_common::LatchkeyError::DuplicateExternalId`] wrapped in
/// the returned `anyhow::Error`, so callers can downcast it.
#[async_trait]
pub trait IdentityPersistence: Send + Sync {
    /// Find an identity by its external identifier
    async fn identity_find_by_external_id(
        &self,
        external_id: &str,
    ) -> anyhow::Result<Option<IdentityRecord>>;

    /// Create a new identity, assigning its id
    async fn identity_insert(&self, external_id: &str) -> anyhow::Result<IdentityRecord>;

    /// Count stored identities
    async fn identity_count(&self) -> anyhow::Result<u64>;
}
