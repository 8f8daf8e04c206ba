//! Redis coordination store
//!
//! Lock records are plain string keys holding the owner's token:
//!
//! - acquire: `SET key token NX PX ttl`
//! - release: compare-and-delete in a Lua script, so a stale holder cannot
//!   remove a record written by a newer holder
//! - probe: `EXISTS key` (Redis drops the key itself once the TTL passes)
//!
//! ## Example
//!
//! ```ignore
//! use latchkey_consistency::RedisCoordinationStore;
//!
//! let store = RedisCoordinationStore::connect("redis://127.0.0.1:6379").await?;
//! ```

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use super::model::{LockToken, saturating_millis};
use super::store::CoordinationStore;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Redis-backed coordination store
///
/// Uses a `ConnectionManager`, which multiplexes one connection and reconnects
/// on failure; cloning the store shares that connection.
#[derive(Clone)]
pub struct RedisCoordinationStore {
    connection: ConnectionManager,
    release_script: Script,
}

impl RedisCoordinationStore {
    /// Connect to Redis with a connection string (e.g. "redis://localhost:6379")
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let client = Client::open(connection_string)
            .with_context(|| format!("Failed to create Redis client for {}", connection_string))?;
        let connection = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn put_if_absent(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        let mut conn = self.connection.clone();
        // PX rejects 0, callers validate the lease before reaching the store
        let ttl_ms = saturating_millis(ttl).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis SET NX failed for {}", key))?;

        Ok(reply.is_some())
    }

    async fn delete_if_match(&self, key: &str, token: &LockToken) -> anyhow::Result<bool> {
        let mut conn = self.connection.clone();

        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("Redis release script failed for {}", key))?;

        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.connection.clone();

        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis EXISTS failed for {}", key))?;

        Ok(count > 0)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
