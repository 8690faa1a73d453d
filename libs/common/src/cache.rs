//! Redis cache module
//!
//! This module provides the Redis connection used when login attempt counters
//! must be shared between several panel instances. Counters are plain integer
//! keys whose TTL is fixed by the first increment of a window.

use anyhow::Result;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::info;

/// Increment a counter unless it already reached the limit, arming its expiry
/// only when the increment created it so later increments never extend the
/// window. Returns -1 when the limit was reached.
const INCREMENT_BELOW_LIMIT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[2]) then
    return -1
end
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Self {
        let url = crate::config::optional("REDIS_URL")
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        RedisConfig { url }
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized");
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Read a counter, `None` when the key does not exist or has expired
    pub async fn get_count(&self, key: &str) -> Result<Option<u32>> {
        let mut conn = self.get_connection().await?;
        let value: Option<u32> = conn.get(key).await?;
        Ok(value)
    }

    /// Atomically increment a counter whose window starts at its first increment
    ///
    /// Returns the new count, or `None` without touching the counter when it
    /// already holds `limit`.
    pub async fn increment_below(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
    ) -> Result<Option<u32>> {
        let mut conn = self.get_connection().await?;
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let count: i64 = Script::new(INCREMENT_BELOW_LIMIT)
            .key(key)
            .arg(window_ms)
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;
        Ok(u32::try_from(count).ok())
    }

    /// Remaining lifetime of a key, `None` when it has no expiry or does not exist
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.get_connection().await?;
        let millis: i64 = conn.pttl(key).await?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}
