//! Latchkey Consistency - Distributed locking
//!
//! This crate provides:
//! - Key-scoped distributed lock over a shared coordination store
//! - Guarded execution: run a critical section under a key's lock with a
//!   bounded wait and a fallback path
//! - In-memory coordination store, and a Redis store behind the `redis` feature

pub mod lock;

// Re-export lock types
pub use lock::{
    BackoffPolicy, CoordinationStore, DistributedLock, LockExecuteOptions, LockGuard, LockRecord,
    LockStats, LockToken, MemoryCoordinationStore, Outcome,
};

#[cfg(feature = "redis")]
pub use lock::RedisCoordinationStore;
