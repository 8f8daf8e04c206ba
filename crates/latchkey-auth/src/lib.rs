//! Latchkey Auth - Identity resolution
//!
//! This crate provides:
//! - Find-or-create of identity records under a per-identifier lock
//! - Login result envelope

pub mod model;
pub mod service;

// Re-export commonly used types
pub use model::*;
pub use service::IdentityService;
