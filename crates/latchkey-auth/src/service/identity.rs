//! Identity service
//!
//! Find-or-create for identity records keyed by an external login identifier.
//! Creation runs under a per-identifier distributed lock with a double-checked
//! lookup, so concurrent first logins for one identifier create one record.

use std::sync::Arc;

use tracing::{debug, info, warn};

use latchkey_common::{LatchkeyError, identity_lock_key};
use latchkey_consistency::{DistributedLock, LockExecuteOptions};
use latchkey_persistence::{IdentityPersistence, IdentityRecord};

use crate::model::{EXTERNAL_ID_EMPTY_MESSAGE, LoginResult};

pub struct IdentityService {
    persistence: Arc<dyn IdentityPersistence>,
    lock: DistributedLock,
    options: LockExecuteOptions,
}

impl IdentityService {
    pub fn new(
        persistence: Arc<dyn IdentityPersistence>,
        lock: DistributedLock,
        options: LockExecuteOptions,
    ) -> Self {
        Self {
            persistence,
            lock,
            options,
        }
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub fn options(&self) -> &LockExecuteOptions {
        &self.options
    }

    /// Resolve the identity for `external_id`, creating it on first use.
    ///
    /// A read hit returns without touching the lock. Fails with
    /// [`LatchkeyError::LockBusy`] if the identity lock could not be acquired
    /// within the configured wait.
    pub async fn find_or_create(&self, external_id: &str) -> Result<IdentityRecord, LatchkeyError> {
        validate_external_id(external_id)?;

        if let Some(record) = self.lookup(external_id).await? {
            return Ok(record);
        }

        let key = identity_lock_key(external_id);
        self.lock
            .lock_execute(
                &key,
                &self.options,
                || self.create_if_absent(external_id),
                || async move {
                    warn!(external_id = %external_id, "Identity lock busy, rejecting request");
                    Err(LatchkeyError::LockBusy(external_id.to_string()))
                },
            )
            .await
    }

    /// Lookup then insert without taking the identity lock.
    ///
    /// Concurrent first calls for one identifier may each create a record when
    /// the backend does not enforce uniqueness.
    pub async fn find_or_create_unguarded(
        &self,
        external_id: &str,
    ) -> Result<IdentityRecord, LatchkeyError> {
        validate_external_id(external_id)?;
        self.create_if_absent(external_id).await
    }

    /// Login by external identifier, wrapping the outcome in a result envelope
    pub async fn login(&self, external_id: &str) -> LoginResult {
        to_login_result(self.find_or_create(external_id).await)
    }

    /// Login through the unguarded path
    pub async fn login_unguarded(&self, external_id: &str) -> LoginResult {
        to_login_result(self.find_or_create_unguarded(external_id).await)
    }

    async fn lookup(&self, external_id: &str) -> Result<Option<IdentityRecord>, LatchkeyError> {
        self.persistence
            .identity_find_by_external_id(external_id)
            .await
            .map_err(LatchkeyError::from_store)
    }

    async fn create_if_absent(&self, external_id: &str) -> Result<IdentityRecord, LatchkeyError> {
        // Another caller may have created it while we waited
        if let Some(record) = self.lookup(external_id).await? {
            debug!(external_id = %external_id, "Identity found on re-check");
            return Ok(record);
        }

        match self
            .persistence
            .identity_insert(external_id)
            .await
            .map_err(LatchkeyError::from_store)
        {
            Ok(record) => {
                info!(external_id = %external_id, id = record.id, "Identity created");
                metrics::counter!("latchkey_identity_created_total").increment(1);
                Ok(record)
            }
            Err(LatchkeyError::DuplicateExternalId(_)) => {
                debug!(external_id = %external_id, "Insert conflicted, resolving existing identity");
                self.lookup(external_id)
                    .await?
                    .ok_or_else(|| LatchkeyError::DuplicateExternalId(external_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

fn validate_external_id(external_id: &str) -> Result<(), LatchkeyError> {
    if external_id.trim().is_empty() {
        return Err(LatchkeyError::IllegalArgument(
            EXTERNAL_ID_EMPTY_MESSAGE.to_string(),
        ));
    }
    Ok(())
}

fn to_login_result(result: Result<IdentityRecord, LatchkeyError>) -> LoginResult {
    let login = match &result {
        Ok(record) => LoginResult::ok(record.id),
        Err(e) => LoginResult::from(e),
    };
    let outcome = if login.is_success() { "success" } else { "failure" };
    metrics::counter!("latchkey_login_total", "outcome" => outcome).increment(1);
    login
}
