//! Guarded execution
//!
//! Runs a critical section while holding a key's lock, waiting a bounded time
//! for the lock and taking a fallback path when it cannot be obtained.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::model::{LockExecuteOptions, Outcome, saturating_millis};
use super::service::{DistributedLock, LockGuard, validate_lease};

/// Floor for the pause between attempts, so a zero backoff cannot spin
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

impl DistributedLock {
    /// Acquire `key`, retrying until `options.max_wait()` has elapsed.
    ///
    /// Busy results, store errors and store calls that outlive the remaining
    /// budget are all retried. At least one attempt is always made. Returns
    /// `None` once the wait budget is spent.
    pub async fn acquire_within(&self, key: &str, options: &LockExecuteOptions) -> Option<LockGuard> {
        let hold = options.hold();
        if let Err(e) = validate_lease(key, hold) {
            warn!(key = %key, error = %e, "Refusing to acquire lock");
            return None;
        }

        let Some(deadline) = Instant::now().checked_add(options.max_wait()) else {
            warn!(key = %key, max_wait_ms = options.max_wait_ms, "Lock wait budget is out of range");
            return None;
        };
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let budget = deadline.saturating_duration_since(Instant::now()).max(MIN_RETRY_DELAY);
            match tokio::time::timeout(budget, self.try_lock(key, hold)).await {
                Ok(Ok(Some(guard))) => {
                    debug!(key = %key, attempt, "Lock acquired for guarded execution");
                    return Some(guard);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(key = %key, attempt, error = %e, "Lock acquisition failed, will retry");
                }
                Err(_) => {
                    // A write that landed anyway is reclaimed when its lease runs out
                    self.record_store_error();
                    warn!(key = %key, attempt, budget_ms = saturating_millis(budget), "Lock acquisition timed out");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(key = %key, attempts = attempt, "Gave up waiting for lock");
                return None;
            }

            let delay = options
                .backoff
                .calculate_delay(attempt)
                .min(hold / 4)
                .max(MIN_RETRY_DELAY)
                .min(deadline - now);
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `critical_section` exclusively for `key`.
    ///
    /// The lock is released after the section finishes, whatever it returns.
    /// If the section panics or this future is dropped mid-section, the guard's
    /// drop hands the release to the runtime.
    pub async fn try_execute<R, F, Fut>(
        &self,
        key: &str,
        options: &LockExecuteOptions,
        critical_section: F,
    ) -> Outcome<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let Some(guard) = self.acquire_within(key, options).await else {
            self.stats
                .timed_out_executions
                .fetch_add(1, Ordering::Relaxed);
            metrics::counter!("latchkey_lock_execute_timeout_total", "backend" => self.store().backend())
                .increment(1);
            return Outcome::TimedOut;
        };

        let value = critical_section().await;

        // The lease still bounds how long the record can outlive us
        let release_budget = options.max_wait().max(MIN_RETRY_DELAY);
        match tokio::time::timeout(release_budget, guard.release()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Lock release failed after guarded execution");
            }
            Err(_) => {
                self.record_store_error();
                warn!(key = %key, "Lock release timed out after guarded execution");
            }
        }

        Outcome::Ran(value)
    }

    /// Run `critical_section` under the lock for `key`, or `fallback` if the
    /// lock cannot be acquired within `options.max_wait()`.
    pub async fn lock_execute<R, F, Fut, G, GFut>(
        &self,
        key: &str,
        options: &LockExecuteOptions,
        critical_section: F,
        fallback: G,
    ) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = R>,
    {
        match self.try_execute(key, options, critical_section).await {
            Outcome::Ran(value) => value,
            Outcome::TimedOut => {
                warn!(key = %key, max_wait_ms = options.max_wait_ms, "Lock wait timed out, running fallback");
                fallback().await
            }
        }
    }
}
