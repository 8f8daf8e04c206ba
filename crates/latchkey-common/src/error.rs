//! Error types and error codes for Latchkey
//!
//! This module defines:
//! - `LatchkeyError`: the closed error taxonomy surfaced to callers
//! - `ErrorCode`: Structured error codes for result envelopes

use serde::{Deserialize, Serialize};

/// Application-specific error types
///
/// Collaborator backends (coordination stores, persistence) report failures as
/// `anyhow::Error`; the identity layer folds them into these variants so the
/// caller never sees a backend's native error vocabulary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LatchkeyError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("too many concurrent requests for identity '{0}', try again")]
    LockBusy(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("external id '{0}' already exist")]
    DuplicateExternalId(String),
}

impl LatchkeyError {
    /// Normalize a collaborator error.
    ///
    /// A `LatchkeyError` carried inside the `anyhow::Error` is passed through
    /// unchanged; anything else is reported as `StoreUnavailable`.
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<LatchkeyError>() {
            Ok(typed) => typed,
            Err(other) => LatchkeyError::StoreUnavailable(format!("{:#}", other)),
        }
    }

    /// Whether retrying the whole call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LatchkeyError::LockBusy(_) | LatchkeyError::StoreUnavailable(_)
        )
    }

    /// Error code reported in result envelopes
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            LatchkeyError::IllegalArgument(_) => PARAMETER_VALIDATE_ERROR,
            LatchkeyError::LockBusy(_) => LOCK_BUSY,
            LatchkeyError::StoreUnavailable(_) => DATA_ACCESS_ERROR,
            LatchkeyError::DuplicateExternalId(_) => RESOURCE_CONFLICT,
        }
    }
}

/// Error code structure for result envelopes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "OK",
};

pub const LOCK_BUSY: ErrorCode<'static> = ErrorCode {
    code: -1,
    message: "too many concurrent requests, try again later",
};

pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const RESOURCE_CONFLICT: ErrorCode<'static> = ErrorCode {
    code: 20005,
    message: "resource conflict",
};
