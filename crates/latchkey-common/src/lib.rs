//! Latchkey Common - Shared error types and key helpers
//!
//! This crate provides the foundational types used across all Latchkey components:
//! - Error taxonomy and error codes
//! - Lock key derivation

pub mod error;

pub use error::{ErrorCode, LatchkeyError};

/// Prefix shared by every lock key written to the coordination store
pub const LOCK_KEY_PREFIX: &str = "lock";

/// Operation name used for identity find-or-create locks
pub const IDENTITY_LOCK_OPERATION: &str = "identity";

/// Build a lock key in `lock:<operation>:<identifier>` form
pub fn lock_key(operation: &str, identifier: &str) -> String {
    format!("{}:{}:{}", LOCK_KEY_PREFIX, operation, identifier)
}

/// Lock key guarding creation of the identity record for `external_id`
pub fn identity_lock_key(external_id: &str) -> String {
    lock_key(IDENTITY_LOCK_OPERATION, external_id)
}
