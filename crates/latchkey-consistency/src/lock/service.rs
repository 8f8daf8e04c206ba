//! Distributed Lock Service
//!
//! Provides:
//! - Non-blocking acquire with a lease
//! - Token-checked release
//! - Liveness probe
//! - Scoped acquisition through [`LockGuard`]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use latchkey_common::LatchkeyError;

use super::model::{LockStats, LockToken, lease_deadline, saturating_millis};
use super::store::CoordinationStore;

#[derive(Default)]
pub(crate) struct LockStatsCollector {
    total_acquisitions: AtomicU64,
    busy_acquisitions: AtomicU64,
    total_releases: AtomicU64,
    stale_releases: AtomicU64,
    store_errors: AtomicU64,
    pub(crate) timed_out_executions: AtomicU64,
}

/// Key-scoped mutual exclusion over a shared coordination store
///
/// Cheap to clone; clones share the store handle and statistics.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    pub(crate) stats: Arc<LockStatsCollector>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            stats: Arc::new(LockStatsCollector::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Try to acquire `key` for `hold` without waiting.
    ///
    /// Returns the ownership token, or `None` if a live lock already exists.
    pub async fn acquire(&self, key: &str, hold: Duration) -> anyhow::Result<Option<LockToken>> {
        validate_lease(key, hold)?;

        let token = LockToken::generate();
        match self.store.put_if_absent(key, &token, hold).await {
            Ok(true) => {
                self.stats.total_acquisitions.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("latchkey_lock_acquired_total", "backend" => self.store.backend())
                    .increment(1);
                debug!(key = %key, hold_ms = saturating_millis(hold), "Lock acquired");
                Ok(Some(token))
            }
            Ok(false) => {
                self.stats.busy_acquisitions.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("latchkey_lock_busy_total", "backend" => self.store.backend())
                    .increment(1);
                debug!(key = %key, "Lock is held by another owner");
                Ok(None)
            }
            Err(e) => {
                self.record_store_error();
                Err(e)
            }
        }
    }

    /// Release `key` if `token` still owns it.
    ///
    /// Returns `false` without error when the lock already expired or now
    /// belongs to another holder.
    pub async fn release(&self, key: &str, token: &LockToken) -> anyhow::Result<bool> {
        match self.store.delete_if_match(key, token).await {
            Ok(true) => {
                self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("latchkey_lock_released_total", "backend" => self.store.backend())
                    .increment(1);
                debug!(key = %key, "Lock released");
                Ok(true)
            }
            Ok(false) => {
                self.stats.stale_releases.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Release skipped, lock expired or owned by another token");
                Ok(false)
            }
            Err(e) => {
                self.record_store_error();
                Err(e)
            }
        }
    }

    /// Whether a live lock currently exists for `key`.
    ///
    /// Diagnostic only: the answer may be stale as soon as it is returned.
    pub async fn is_locked(&self, key: &str) -> anyhow::Result<bool> {
        self.store.exists(key).await.inspect_err(|_| self.record_store_error())
    }

    /// Acquire without waiting, returning a guard that releases on drop
    pub async fn try_lock(&self, key: &str, hold: Duration) -> anyhow::Result<Option<LockGuard>> {
        Ok(self.acquire(key, hold).await?.map(|token| LockGuard {
            lock: self.clone(),
            key: key.to_string(),
            token: Some(token),
        }))
    }

    /// Get lock statistics
    pub fn stats(&self) -> LockStats {
        LockStats {
            total_acquisitions: self.stats.total_acquisitions.load(Ordering::Relaxed),
            busy_acquisitions: self.stats.busy_acquisitions.load(Ordering::Relaxed),
            total_releases: self.stats.total_releases.load(Ordering::Relaxed),
            stale_releases: self.stats.stale_releases.load(Ordering::Relaxed),
            store_errors: self.stats.store_errors.load(Ordering::Relaxed),
            timed_out_executions: self.stats.timed_out_executions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_store_error(&self) {
        self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_lock_store_errors_total", "backend" => self.store.backend())
            .increment(1);
    }
}

/// Reject leases that are zero or whose end cannot be represented
pub(crate) fn validate_lease(key: &str, hold: Duration) -> Result<(), LatchkeyError> {
    if hold.is_zero() {
        return Err(LatchkeyError::IllegalArgument(format!(
            "lease for lock '{}' must be longer than zero",
            key
        )));
    }
    if lease_deadline(hold).is_none() {
        return Err(LatchkeyError::IllegalArgument(format!(
            "lease of {:?} for lock '{}' is out of range",
            hold, key
        )));
    }
    Ok(())
}

/// A held lock that is released when dropped
///
/// Prefer [`LockGuard::release`], which awaits the store call. Dropping a guard
/// that was not released (panic, cancelled future) hands the release to a
/// background task on the current Tokio runtime; without a runtime the lock is
/// left to expire with its lease.
pub struct LockGuard {
    lock: DistributedLock,
    key: String,
    token: Option<LockToken>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// Release the lock explicitly
    pub async fn release(mut self) -> anyhow::Result<bool> {
        match self.token.take() {
            Some(token) => self.lock.release(&self.key, &token).await,
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = self.lock.clone();
                let key = std::mem::take(&mut self.key);
                handle.spawn(async move {
                    if let Err(e) = lock.release(&key, &token).await {
                        warn!(key = %key, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(key = %self.key, "No runtime to release lock, leaving it to expire");
            }
        }
    }
}
