//! Distributed Lock Implementation
//!
//! This module provides:
//! - Lock data model, execution options and backoff policy
//! - Coordination store abstraction with in-memory and Redis backends
//! - Lock acquire/release/probe service
//! - Guarded execution with bounded wait and fallback

mod execute;
mod model;
#[cfg(feature = "redis")]
mod redis_store;
mod service;
mod store;

pub use model::*;
#[cfg(feature = "redis")]
pub use redis_store::RedisCoordinationStore;
pub use service::*;
pub use store::*;
