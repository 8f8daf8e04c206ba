//! Identity resolution models
//!
//! This file defines the login result envelope and its validation messages.

use serde::{Deserialize, Serialize};

use latchkey_common::LatchkeyError;
use latchkey_common::error::SUCCESS;

pub const EXTERNAL_ID_EMPTY_MESSAGE: &str = "external id must not be empty";

/// Result envelope returned by login
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub code: i32,
    pub message: String,
    /// Identity id, present only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<i64>,
}

impl LoginResult {
    pub fn ok(id: i64) -> Self {
        Self {
            code: SUCCESS.code,
            message: SUCCESS.message.to_string(),
            data: Some(id),
        }
    }

    pub fn err(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS.code
    }
}

impl From<&LatchkeyError> for LoginResult {
    fn from(e: &LatchkeyError) -> Self {
        LoginResult::err(e.error_code().code, &e.to_string())
    }
}
