//! Distributed Lock Data Model

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Opaque proof of ownership for a single successful acquisition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh token, unique to one acquisition attempt
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LockToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock entry as held by an in-process coordination store
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub key: String,
    pub token: LockToken,
    pub expires_at: Instant,
}

impl LockRecord {
    /// Returns `None` if the lease end is not representable as an instant
    pub fn new(key: impl Into<String>, token: LockToken, ttl: Duration) -> Option<Self> {
        Some(Self {
            key: key.into(),
            token,
            expires_at: lease_deadline(ttl)?,
        })
    }

    /// Check if the lease has run out
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Check if the given token holds this lock
    pub fn is_owned_by(&self, token: &str) -> bool {
        self.token.as_str() == token
    }

    /// Remaining lease time, zero once expired
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Instant at which a lease of `ttl` taken now runs out
pub fn lease_deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
    /// Successful acquisitions
    pub total_acquisitions: u64,
    /// Acquisition attempts that found the key held
    pub busy_acquisitions: u64,
    /// Releases that removed the caller's own record
    pub total_releases: u64,
    /// Releases that found the record gone or held by another token
    pub stale_releases: u64,
    /// Calls that failed against the coordination store
    pub store_errors: u64,
    /// Guarded executions that gave up waiting and ran the fallback
    pub timed_out_executions: u64,
}

fn default_initial_delay() -> u64 {
    20
}

fn default_max_delay() -> u64 {
    200
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

/// Delay policy between acquisition attempts of a guarded execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt, in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Backoff multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffPolicy {
    /// Fixed interval between attempts
    pub fn fixed(delay: Duration) -> Self {
        let ms = saturating_millis(delay);
        Self {
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Capped exponential delay after `attempt` failed attempts (1-indexed), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);

        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay for a given attempt with jitter applied, never above `max_delay_ms`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped_delay = self.base_delay(attempt).as_millis() as f64;

        let jitter_range = capped_delay * self.jitter.clamp(0.0, 1.0);
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped_delay + jitter)
            .max(0.0)
            .min(self.max_delay_ms as f64) as u64;

        Duration::from_millis(final_delay)
    }
}

fn default_max_wait() -> u64 {
    3000
}

fn default_hold() -> u64 {
    5000
}

/// Wait budget and lease length for a guarded execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockExecuteOptions {
    /// How long to keep retrying acquisition before running the fallback
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
    /// Lease length of the lock once acquired
    #[serde(default = "default_hold")]
    pub hold_ms: u64,
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

impl Default for LockExecuteOptions {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait(),
            hold_ms: default_hold(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl LockExecuteOptions {
    pub fn new(max_wait: Duration, hold: Duration) -> Self {
        Self {
            max_wait_ms: saturating_millis(max_wait),
            hold_ms: saturating_millis(hold),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

/// Result of a guarded execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    /// The lock was acquired and the critical section ran
    Ran(R),
    /// The wait budget ran out before the lock could be acquired
    TimedOut,
}

impl<R> Outcome<R> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut)
    }

    pub fn into_option(self) -> Option<R> {
        match self {
            Outcome::Ran(value) => Some(value),
            Outcome::TimedOut => None,
        }
    }

    /// Collapse into a value, producing one with `fallback` on timeout
    pub fn unwrap_or_else(self, fallback: impl FnOnce() -> R) -> R {
        match self {
            Outcome::Ran(value) => value,
            Outcome::TimedOut => fallback(),
        }
    }
}
