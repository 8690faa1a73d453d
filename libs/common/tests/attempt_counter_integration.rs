//! Integration tests for the Redis-backed attempt counters
//!
//! These tests need a reachable Redis instance (`REDIS_URL`, default
//! `redis://localhost:6379`) and are ignored by default. Run them with
//! `cargo test -p common -- --ignored`.

use std::time::Duration;

use common::cache::{RedisConfig, RedisPool};

/// Counters keep the expiry armed by their first increment
#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_window_is_fixed_by_first_increment() -> Result<(), Box<dyn std::error::Error>> {
    let pool = RedisPool::new(&RedisConfig::from_env())?;
    assert!(pool.health_check().await?, "Redis health check failed");

    let key = "login_attempts:integration-window";
    pool.delete(key).await?;

    assert_eq!(pool.increment_below(key, Duration::from_secs(60), 10).await?, Some(1));
    let first_ttl = pool.ttl(key).await?.expect("counter should expire");

    // A much longer window on later increments must not move the expiry.
    assert_eq!(pool.increment_below(key, Duration::from_secs(3600), 10).await?, Some(2));
    let second_ttl = pool.ttl(key).await?.expect("counter should expire");
    assert!(second_ttl <= first_ttl);

    assert_eq!(pool.get_count(key).await?, Some(2));

    pool.delete(key).await?;
    assert_eq!(pool.get_count(key).await?, None);

    Ok(())
}

/// Counters disappear once their window has elapsed
#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_counter_expires_after_window() -> Result<(), Box<dyn std::error::Error>> {
    let pool = RedisPool::new(&RedisConfig::from_env())?;

    let key = "login_attempts:integration-expiry";
    pool.delete(key).await?;

    pool.increment_below(key, Duration::from_millis(200), 10).await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(pool.get_count(key).await?, None);
    Ok(())
}

/// A counter at its limit is left untouched
#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_increment_stops_at_limit() -> Result<(), Box<dyn std::error::Error>> {
    let pool = RedisPool::new(&RedisConfig::from_env())?;

    let key = "login_attempts:integration-limit";
    pool.delete(key).await?;

    for expected in 1..=3 {
        assert_eq!(pool.increment_below(key, Duration::from_secs(60), 3).await?, Some(expected));
    }
    assert_eq!(pool.increment_below(key, Duration::from_secs(60), 3).await?, None);
    assert_eq!(pool.get_count(key).await?, Some(3));

    pool.delete(key).await?;
    Ok(())
}
