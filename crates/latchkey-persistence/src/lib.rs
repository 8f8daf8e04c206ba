//! Latchkey Persistence - Identity storage layer
//!
//! This crate provides:
//! - SeaORM entity definition for `identity_user`
//! - Persistence trait abstractions over the identity store
//! - In-memory and external database backends

pub mod entity;
pub mod memory;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export entity prelude
pub use entity::prelude::*;

// Re-export persistence traits
pub use traits::{IdentityPersistence, PersistenceService};

// Re-export backends
pub use memory::MemoryPersistService;
pub use sql::ExternalDbPersistService;

// Re-export model types
pub use model::{IdentityRecord, PersistenceMode};
