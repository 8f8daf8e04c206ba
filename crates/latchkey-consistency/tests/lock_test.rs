// Integration tests for the distributed lock and guarded execution
// Covers racing acquisitions, stale releases, lease expiry and release on every exit path

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use latchkey_common::LatchkeyError;
use latchkey_consistency::{
    BackoffPolicy, CoordinationStore, DistributedLock, LockExecuteOptions, LockToken,
    MemoryCoordinationStore, Outcome,
};

fn memory_lock() -> DistributedLock {
    DistributedLock::new(Arc::new(MemoryCoordinationStore::new()))
}

fn options(max_wait_ms: u64, hold_ms: u64) -> LockExecuteOptions {
    LockExecuteOptions::new(
        Duration::from_millis(max_wait_ms),
        Duration::from_millis(hold_ms),
    )
    .with_backoff(BackoffPolicy::fixed(Duration::from_millis(5)))
}

/// Store wrapper that fails a configurable number of calls before delegating
struct FlakyStore {
    inner: MemoryCoordinationStore,
    failures_left: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryCoordinationStore::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }

    fn maybe_fail(&self) -> anyhow::Result<()> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            anyhow::bail!("connection reset by peer");
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for FlakyStore {
    async fn put_if_absent(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        self.maybe_fail()?;
        self.inner.put_if_absent(key, token, ttl).await
    }

    async fn delete_if_match(&self, key: &str, token: &LockToken) -> anyhow::Result<bool> {
        self.inner.delete_if_match(key, token).await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key).await
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}

/// Store whose calls never complete, like a peer that stopped answering
struct UnresponsiveStore {
    inner: MemoryCoordinationStore,
    hang_on_acquire: bool,
}

#[async_trait]
impl CoordinationStore for UnresponsiveStore {
    async fn put_if_absent(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        if self.hang_on_acquire {
            std::future::pending::<()>().await;
        }
        self.inner.put_if_absent(key, token, ttl).await
    }

    async fn delete_if_match(&self, _key: &str, _token: &LockToken) -> anyhow::Result<bool> {
        std::future::pending().await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key).await
    }

    fn backend(&self) -> &'static str {
        "unresponsive"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_acquisitions_single_winner() {
    let lock = memory_lock();
    let attempts = 64;

    let handles: Vec<_> = (0..attempts)
        .map(|_| {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.acquire("lock:race:k", Duration::from_secs(30))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(lock.stats().busy_acquisitions, attempts - 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_release_does_not_remove_new_holder() {
    let lock = memory_lock();

    let first = lock
        .acquire("k", Duration::from_millis(100))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let second = lock
        .acquire("k", Duration::from_secs(30))
        .await
        .unwrap()
        .expect("expired lease can be reacquired");

    assert!(!lock.release("k", &first).await.unwrap());
    assert!(lock.is_locked("k").await.unwrap());

    assert!(lock.release("k", &second).await.unwrap());
    assert!(!lock.is_locked("k").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_busy_then_reacquire_after_lease() {
    let lock = memory_lock();

    assert!(lock.acquire("k", Duration::from_secs(1)).await.unwrap().is_some());
    assert!(lock.acquire("k", Duration::from_secs(1)).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(lock.acquire("k", Duration::from_secs(1)).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_guarded_sections_never_overlap() {
    let lock = memory_lock();
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let lock = lock.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            let completed = completed.clone();
            tokio::spawn(async move {
                lock.try_execute("lock:section:k", &options(5_000, 5_000), || async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Outcome::Ran(()));
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_release_after_panicking_section() {
    let lock = memory_lock();

    let task_lock = lock.clone();
    let result = tokio::spawn(async move {
        task_lock
            .try_execute("k", &options(100, 30_000), || async {
                panic!("critical section failed");
            })
            .await
    })
    .await;
    assert!(result.unwrap_err().is_panic());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!lock.is_locked("k").await.unwrap());
}

#[tokio::test]
async fn test_release_after_cancellation() {
    let lock = memory_lock();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        lock.try_execute("k", &options(100, 30_000), || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!lock.is_locked("k").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_transient_store_errors_are_retried() {
    let lock = DistributedLock::new(Arc::new(FlakyStore::new(3)));

    let outcome = lock.try_execute("k", &options(1_000, 1_000), || async { "done" }).await;

    assert_eq!(outcome, Outcome::Ran("done"));
    assert_eq!(lock.stats().store_errors, 3);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_store_errors_run_fallback() {
    let lock = DistributedLock::new(Arc::new(FlakyStore::new(usize::MAX)));

    let result = lock
        .lock_execute(
            "k",
            &options(200, 1_000),
            || async { "ran" },
            || async { "fallback" },
        )
        .await;

    assert_eq!(result, "fallback");
    assert!(lock.stats().store_errors > 1);
}

#[tokio::test(start_paused = true)]
async fn test_different_keys_do_not_contend() {
    let lock = memory_lock();
    lock.acquire("lock:identity:a", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let outcome = lock
        .try_execute("lock:identity:b", &options(0, 1_000), || async { 1 })
        .await;
    assert_eq!(outcome, Outcome::Ran(1));
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_store_runs_fallback_within_wait() {
    let lock = DistributedLock::new(Arc::new(UnresponsiveStore {
        inner: MemoryCoordinationStore::new(),
        hang_on_acquire: true,
    }));

    let started = tokio::time::Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(60),
        lock.lock_execute("k", &options(100, 1_000), || async { 1 }, || async { 2 }),
    )
    .await;

    assert_eq!(result.ok(), Some(2));
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(lock.stats().store_errors >= 1);
    assert_eq!(lock.stats().timed_out_executions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_release_does_not_block_result() {
    let lock = DistributedLock::new(Arc::new(UnresponsiveStore {
        inner: MemoryCoordinationStore::new(),
        hang_on_acquire: false,
    }));

    let result = tokio::time::timeout(
        Duration::from_secs(60),
        lock.lock_execute("k", &options(100, 1_000), || async { 1 }, || async { 2 }),
    )
    .await;

    assert_eq!(result.ok(), Some(1));
}

#[tokio::test]
async fn test_out_of_range_lease_is_rejected_without_panic() {
    let lock = memory_lock();

    let err = match lock.try_lock("k", Duration::MAX).await {
        Err(e) => e,
        Ok(_) => panic!("out-of-range lease must be rejected"),
    };
    assert!(matches!(
        err.downcast_ref::<LatchkeyError>(),
        Some(LatchkeyError::IllegalArgument(_))
    ));
    assert!(!lock.is_locked("k").await.unwrap());

    // The store refuses it too instead of overflowing the clock
    let store = MemoryCoordinationStore::new();
    assert!(store
        .put_if_absent("k", &LockToken::generate(), Duration::MAX)
        .await
        .is_err());
}
