// Integration tests for identity resolution
// Covers concurrent first logins, duplicate conflicts, store failures and lock contention

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use latchkey_auth::IdentityService;
use latchkey_common::error::{DATA_ACCESS_ERROR, LOCK_BUSY};
use latchkey_common::{LatchkeyError, identity_lock_key};
use latchkey_consistency::{
    BackoffPolicy, DistributedLock, LockExecuteOptions, MemoryCoordinationStore,
};
use latchkey_persistence::{IdentityPersistence, IdentityRecord, MemoryPersistService};

fn options(max_wait: Duration) -> LockExecuteOptions {
    LockExecuteOptions::new(max_wait, Duration::from_secs(5))
}

fn memory_lock() -> DistributedLock {
    DistributedLock::new(Arc::new(MemoryCoordinationStore::new()))
}

/// Table without a unique index whose round trips are slow enough to interleave
fn racy_store() -> Arc<MemoryPersistService> {
    Arc::new(
        MemoryPersistService::new()
            .with_unique_constraint(false)
            .with_latency(Duration::from_millis(5)),
    )
}

/// Persistence whose lookups miss a fixed number of times, as a lagging
/// replica would after another process inserted the record
struct StaleReadPersistence {
    inner: MemoryPersistService,
    stale_reads_left: AtomicUsize,
}

#[async_trait]
impl IdentityPersistence for StaleReadPersistence {
    async fn identity_find_by_external_id(
        &self,
        external_id: &str,
    ) -> anyhow::Result<Option<IdentityRecord>> {
        let stale = self
            .stale_reads_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.identity_find_by_external_id(external_id).await
    }

    async fn identity_insert(&self, external_id: &str) -> anyhow::Result<IdentityRecord> {
        self.inner.identity_insert(external_id).await
    }

    async fn identity_count(&self) -> anyhow::Result<u64> {
        self.inner.identity_count().await
    }
}

/// Persistence that fails every call
struct UnreachablePersistence;

#[async_trait]
impl IdentityPersistence for UnreachablePersistence {
    async fn identity_find_by_external_id(
        &self,
        _external_id: &str,
    ) -> anyhow::Result<Option<IdentityRecord>> {
        anyhow::bail!("connection refused")
    }

    async fn identity_insert(&self, _external_id: &str) -> anyhow::Result<IdentityRecord> {
        anyhow::bail!("connection refused")
    }

    async fn identity_count(&self) -> anyhow::Result<u64> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_logins_create_one_record_per_identity() {
    let store = racy_store();
    let service = Arc::new(IdentityService::new(
        store.clone(),
        memory_lock(),
        options(Duration::from_secs(10)),
    ));

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let service = service.clone();
            let external_id = format!("openId:{}", i % 10);
            tokio::spawn(async move {
                let record = service.find_or_create(&external_id).await;
                (external_id, record)
            })
        })
        .collect();

    let mut ids: HashMap<String, i64> = HashMap::new();
    for handle in handles {
        let (external_id, record) = handle.await.unwrap();
        let record = record.unwrap();
        assert_eq!(record.external_id, external_id);
        let id = *ids.entry(external_id).or_insert(record.id);
        assert_eq!(id, record.id);
    }

    assert_eq!(ids.len(), 10);
    assert_eq!(ids.values().collect::<HashSet<_>>().len(), 10);
    assert_eq!(store.insert_count(), 10);
    assert_eq!(store.identity_count().await.unwrap(), 10);
    for n in 0..10 {
        assert_eq!(store.records_for(&format!("openId:{}", n)).len(), 1);
    }
}

#[tokio::test]
async fn test_unguarded_path_creates_duplicates() {
    let store = racy_store();
    let service = IdentityService::new(
        store.clone(),
        memory_lock(),
        options(Duration::from_secs(10)),
    );

    join_all((0..20).map(|_| service.find_or_create_unguarded("openId:dup"))).await;

    assert!(store.records_for("openId:dup").len() > 1);
}

#[tokio::test]
async fn test_guarded_path_under_same_load_creates_one() {
    let store = racy_store();
    let service = IdentityService::new(
        store.clone(),
        memory_lock(),
        options(Duration::from_secs(10))
            .with_backoff(BackoffPolicy::fixed(Duration::from_millis(5))),
    );

    let results = join_all((0..20).map(|_| service.find_or_create("openId:dup"))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(store.records_for("openId:dup").len(), 1);
}

#[tokio::test]
async fn test_sequential_calls_insert_once() {
    let store = Arc::new(MemoryPersistService::new());
    let service = IdentityService::new(store.clone(), memory_lock(), options(Duration::from_secs(1)));

    let first = service.find_or_create("a").await.unwrap();
    let inserts = store.insert_count();
    let second = service.find_or_create("a").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(inserts, 1);
    assert_eq!(store.insert_count(), inserts);
}

#[tokio::test]
async fn test_duplicate_conflict_resolves_existing_record() {
    let inner = MemoryPersistService::new();
    let existing = inner.identity_insert("openId:7").await.unwrap();
    // Both the fast-path lookup and the re-check miss the existing record
    let persistence = Arc::new(StaleReadPersistence {
        inner,
        stale_reads_left: AtomicUsize::new(2),
    });
    let service = IdentityService::new(persistence.clone(), memory_lock(), options(Duration::from_secs(1)));

    let record = service.find_or_create("openId:7").await.unwrap();

    assert_eq!(record.id, existing.id);
    assert_eq!(persistence.inner.insert_count(), 1);
}

#[tokio::test]
async fn test_duplicate_conflict_without_visible_record_is_surfaced() {
    let inner = MemoryPersistService::new();
    inner.identity_insert("openId:7").await.unwrap();
    let persistence = Arc::new(StaleReadPersistence {
        inner,
        stale_reads_left: AtomicUsize::new(usize::MAX),
    });
    let service = IdentityService::new(persistence, memory_lock(), options(Duration::from_secs(1)));

    let err = service.find_or_create("openId:7").await.unwrap_err();
    assert_eq!(err, LatchkeyError::DuplicateExternalId("openId:7".to_string()));
}

#[tokio::test]
async fn test_store_failure_is_normalized() {
    let service = IdentityService::new(
        Arc::new(UnreachablePersistence),
        memory_lock(),
        options(Duration::from_secs(1)),
    );

    let err = service.find_or_create("openId:1").await.unwrap_err();
    match &err {
        LatchkeyError::StoreUnavailable(message) => assert!(message.contains("connection refused")),
        other => panic!("unexpected error: {:?}", other),
    }

    let result = service.login("openId:1").await;
    assert_eq!(result.code, DATA_ACCESS_ERROR.code);
    assert_eq!(result.data, None);
}

#[tokio::test(start_paused = true)]
async fn test_login_reports_contention() {
    let store = Arc::new(MemoryPersistService::new());
    let lock = memory_lock();
    let service = IdentityService::new(store.clone(), lock.clone(), options(Duration::from_millis(100)));

    lock.acquire(&identity_lock_key("openId:1"), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let result = service.login("openId:1").await;
    assert_eq!(result.code, LOCK_BUSY.code);
    assert_eq!(result.data, None);
    assert_eq!(store.insert_count(), 0);

    // Other identities are unaffected
    assert!(service.login("openId:2").await.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_login_succeeds_after_abandoned_lock_expires() {
    let store = Arc::new(MemoryPersistService::new());
    let lock = memory_lock();
    let service = IdentityService::new(store.clone(), lock.clone(), options(Duration::from_secs(3)));

    // Holder crashed without releasing; its lease runs out inside the wait
    lock.acquire(&identity_lock_key("openId:1"), Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();

    let result = service.login("openId:1").await;
    assert!(result.is_success());
    assert_eq!(store.insert_count(), 1);
}

mod props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn find_or_create_is_idempotent(external_id in "[a-zA-Z0-9:_-]{1,24}", repeats in 1usize..5) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let store = Arc::new(MemoryPersistService::new());
                let service = IdentityService::new(store.clone(), memory_lock(), options(Duration::from_secs(1)));

                let first = service.find_or_create(&external_id).await.unwrap();
                for _ in 0..repeats {
                    let again = service.find_or_create(&external_id).await.unwrap();
                    prop_assert_eq!(again.id, first.id);
                }
                prop_assert_eq!(store.insert_count(), 1);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
