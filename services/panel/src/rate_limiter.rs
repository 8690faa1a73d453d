//! Login attempt limiter for preventing brute force attacks
//!
//! Attempts are counted per client address in a fixed window that opens with
//! the first attempt and only closes once it has fully elapsed. Counters live
//! in an [`AttemptStore`]: in process memory for a single instance, or in
//! Redis when several instances must share them.
//!
//! The in-memory store is process local. Restarting the service or running
//! more than one instance resets or splits the counters.

use anyhow::Result;
use async_trait::async_trait;
use common::cache::RedisPool;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Attempts allowed in one window before the address is blocked
    pub max_attempts: u32,
    /// Length of the counting window
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Outcome of asking to make a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Counted; holds the attempts made in the window including this one
    Allowed(u32),
    /// The window's limit was already reached and nothing was counted
    Blocked,
}

/// Storage for per-address attempt counters
///
/// Each method must act atomically on the entry for `key`.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Count an attempt unless `limit` attempts are already recorded in the
    /// live window, opening a new window if none is live
    async fn reserve(&self, key: &str, window: Duration, limit: u32) -> Result<Attempt>;

    /// Forget every attempt for `key`
    async fn clear(&self, key: &str) -> Result<()>;
}

/// A live attempt counter
#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    count: u32,
    reset_at: Instant,
}

impl AttemptRecord {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }
}

/// Attempt counters kept in process memory
#[derive(Debug, Clone)]
pub struct MemoryAttemptStore {
    entries: Arc<Mutex<HashMap<String, AttemptRecord>>>,
    sweep_threshold: usize,
}

impl MemoryAttemptStore {
    /// Number of entries above which an attempt triggers a sweep of expired ones
    pub const DEFAULT_SWEEP_THRESHOLD: usize = 100;

    pub fn new() -> Self {
        Self::with_sweep_threshold(Self::DEFAULT_SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            sweep_threshold,
        }
    }

    /// Number of entries currently held, expired or not
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for MemoryAttemptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn reserve(&self, key: &str, window: Duration, limit: u32) -> Result<Attempt> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let record = entries
            .entry(key.to_string())
            .or_insert_with(|| AttemptRecord::fresh(now, window));
        if record.is_expired(now) {
            *record = AttemptRecord::fresh(now, window);
        }

        let attempt = if record.count >= limit {
            Attempt::Blocked
        } else {
            record.count += 1;
            Attempt::Allowed(record.count)
        };

        if entries.len() > self.sweep_threshold {
            let before = entries.len();
            entries.retain(|_, record| !record.is_expired(now));
            debug!("Swept {} expired login attempt records", before - entries.len());
        }

        Ok(attempt)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Attempt counters shared through Redis
///
/// Each address maps to one integer key whose TTL is armed by the first
/// attempt of the window, so Redis handles expiry. The limit check and the
/// increment run as one script.
#[derive(Clone)]
pub struct RedisAttemptStore {
    pool: RedisPool,
}

impl RedisAttemptStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn key(address: &str) -> String {
        format!("login_attempts:{}", address)
    }
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn reserve(&self, key: &str, window: Duration, limit: u32) -> Result<Attempt> {
        let count = self
            .pool
            .increment_below(&Self::key(key), window, limit)
            .await?;
        Ok(count.map_or(Attempt::Blocked, Attempt::Allowed))
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.pool.delete(&Self::key(key)).await
    }
}

/// Guards the login endpoint
///
/// An attempt is counted before the credentials are compared and forgotten
/// again when they match, so concurrent guesses from one address can never
/// get past the limit.
#[derive(Clone)]
pub struct LoginLimiter {
    config: RateLimiterConfig,
    store: Arc<dyn AttemptStore>,
}

impl LoginLimiter {
    pub fn new(config: RateLimiterConfig, store: Arc<dyn AttemptStore>) -> Self {
        Self { config, store }
    }

    /// Claim one of the attempts `address` has left in the current window
    pub async fn reserve(&self, address: &str) -> Result<Attempt> {
        let attempt = self
            .store
            .reserve(address, self.config.window, self.config.max_attempts)
            .await?;

        if attempt == Attempt::Allowed(self.config.max_attempts) {
            warn!(
                "Last login attempt for {} in the next {} seconds",
                address,
                self.config.window.as_secs()
            );
        }
        Ok(attempt)
    }

    /// Forget attempts from `address` after a successful login
    pub async fn clear(&self, address: &str) -> Result<()> {
        self.store.clear(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "203.0.113.7";
    const WINDOW: Duration = Duration::from_secs(15 * 60);

    fn limiter() -> LoginLimiter {
        LoginLimiter::new(
            RateLimiterConfig::default(),
            Arc::new(MemoryAttemptStore::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_after_five_attempts() {
        let limiter = limiter();

        for expected in 1..=5 {
            assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Allowed(expected));
        }

        assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Blocked);
        assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Blocked);
        assert_eq!(limiter.reserve("198.51.100.1").await.unwrap(), Attempt::Allowed(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unblocks_after_window() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.reserve(ADDRESS).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Blocked);

        tokio::time::advance(Duration::from_secs(60) + Duration::from_millis(1)).await;
        assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Allowed(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_not_extended_by_later_attempts() {
        let limiter = limiter();

        limiter.reserve(ADDRESS).await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        for _ in 0..4 {
            limiter.reserve(ADDRESS).await.unwrap();
        }
        assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Blocked);

        // Window opened by the first attempt closes 15 minutes after it.
        tokio::time::advance(Duration::from_secs(5 * 60) + Duration::from_millis(1)).await;
        assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Allowed(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_attempts_are_not_counted() {
        let store = MemoryAttemptStore::new();

        for _ in 0..3 {
            store.reserve(ADDRESS, WINDOW, 2).await.unwrap();
        }
        // Raising the limit shows only the two allowed attempts were recorded.
        assert_eq!(store.reserve(ADDRESS, WINDOW, 5).await.unwrap(), Attempt::Allowed(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_immediately() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.reserve(ADDRESS).await.unwrap();
        }

        limiter.clear(ADDRESS).await.unwrap();
        assert_eq!(limiter.reserve(ADDRESS).await.unwrap(), Attempt::Allowed(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_prunes_expired_records() {
        let store = MemoryAttemptStore::with_sweep_threshold(3);
        let window = Duration::from_secs(60);

        for i in 0..3 {
            store.reserve(&format!("10.0.0.{i}"), window, 5).await.unwrap();
        }
        tokio::time::advance(window + Duration::from_millis(1)).await;
        assert_eq!(store.len().await, 3);

        // Fourth entry crosses the threshold; only the live one survives.
        store.reserve("10.0.0.3", window, 5).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.reserve("10.0.0.3", window, 5).await.unwrap(), Attempt::Allowed(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_attempts_never_exceed_limit() {
        let store = Arc::new(MemoryAttemptStore::new());

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve(ADDRESS, WINDOW, 5).await })
            })
            .collect();

        let mut allowed = Vec::new();
        for task in tasks {
            if let Attempt::Allowed(count) = task.await.unwrap().unwrap() {
                allowed.push(count);
            }
        }
        allowed.sort_unstable();

        assert_eq!(allowed, vec![1, 2, 3, 4, 5]);
    }
}
