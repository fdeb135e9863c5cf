//! Fixed-window rate counters keyed by (action, source identity).
//!
//! The counter store is an optional collaborator: when it is unreachable the
//! caller is allowed through and the failure is surfaced as a warning only.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::Arc;

/// Outcome of a single increment-and-check against a fixed window.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// A fixed-window counter store.
///
/// `increment_and_check` counts the current request, so a decision with
/// `allowed == false` means this request is the one past the limit.
#[async_trait]
pub trait RateCounter: Send + Sync {
    async fn increment_and_check(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateDecision, anyhow::Error>;
}

/// Increment-and-check that fails open when the backing store errors.
pub async fn check_fail_open(
    counter: &dyn RateCounter,
    key: &str,
    limit: u32,
    window_secs: u64,
) -> RateDecision {
    match counter.increment_and_check(key, limit, window_secs).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(key, error = %e, "rate counter unavailable, failing open");
            RateDecision {
                allowed: true,
                remaining: limit,
                reset_at: Utc::now() + Duration::seconds(window_secs as i64),
            }
        }
    }
}

/// Redis-backed fixed-window counter.
///
/// Window state is a single key: `INCR` counts, `EXPIRE` (set on first hit)
/// ends the window. Rollover happens when the key expires.
#[derive(Clone)]
pub struct RedisRateCounter {
    conn: ConnectionManager,
}

impl RedisRateCounter {
    /// Connect to the counter store. A failure here is not fatal for the
    /// service; callers are expected to fall back to in-process counting.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let client = redis::Client::open(url)?;

        // ConnectionManager reconnects on its own after drops.
        let conn = client.get_connection_manager().await.map_err(|e| {
            anyhow::anyhow!("Failed to connect to rate counter store: {}", e)
        })?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateCounter for RedisRateCounter {
    async fn increment_and_check(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateDecision, anyhow::Error> {
        let mut conn = self.conn.clone();

        let count: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        if count == 1 {
            let _: i64 = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs)
                .query_async(&mut conn)
                .await?;
        }

        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        let reset_in = if ttl > 0 { ttl } else { window_secs as i64 };

        Ok(RateDecision {
            allowed: count <= u64::from(limit),
            remaining: u32::try_from(u64::from(limit).saturating_sub(count)).unwrap_or(0),
            reset_at: Utc::now() + Duration::seconds(reset_in),
        })
    }
}

/// In-process fixed-window counter.
///
/// Used in tests and as the fallback when the Redis store is unreachable at
/// startup. Counts are per process, so limits are only approximate once the
/// service runs with more than one instance.
#[derive(Clone, Default)]
pub struct MemoryRateCounter {
    windows: Arc<DashMap<String, (DateTime<Utc>, u32)>>,
}

impl MemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCounter for MemoryRateCounter {
    async fn increment_and_check(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateDecision, anyhow::Error> {
        let now = Utc::now();
        let window = Duration::seconds(window_secs as i64);

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert((now + window, 0));

        let (reset_at, count) = *entry;
        if reset_at <= now {
            // Window rolled over: start fresh rather than carrying the count.
            *entry = (now + window, 1);
        } else {
            *entry = (reset_at, count + 1);
        }
        let (reset_at, count) = *entry;
        drop(entry);

        Ok(RateDecision {
            allowed: count <= limit,
            remaining: limit.saturating_sub(count),
            reset_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let counter = MemoryRateCounter::new();

        for i in 0..3 {
            let d = counter.increment_and_check("login:1.2.3.4", 3, 60).await.unwrap();
            assert!(d.allowed, "request {} should be allowed", i);
        }

        let d = counter.increment_and_check("login:1.2.3.4", 3, 60).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let counter = MemoryRateCounter::new();

        for _ in 0..3 {
            counter.increment_and_check("login:1.2.3.4", 3, 60).await.unwrap();
        }
        let d = counter.increment_and_check("login:5.6.7.8", 3, 60).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, 2);
    }

    #[tokio::test]
    async fn window_rollover_resets_count() {
        let counter = MemoryRateCounter::new();

        // Zero-length window expires immediately, so every call starts a new one.
        let d = counter.increment_and_check("mfa:host", 1, 0).await.unwrap();
        assert!(d.allowed);
        let d = counter.increment_and_check("mfa:host", 1, 0).await.unwrap();
        assert!(d.allowed, "rollover must reset the counter");
    }

    #[tokio::test]
    async fn fail_open_allows_on_store_error() {
        struct BrokenCounter;

        #[async_trait]
        impl RateCounter for BrokenCounter {
            async fn increment_and_check(
                &self,
                _key: &str,
                _limit: u32,
                _window_secs: u64,
            ) -> Result<RateDecision, anyhow::Error> {
                Err(anyhow::anyhow!("store unavailable"))
            }
        }

        let d = check_fail_open(&BrokenCounter, "login:1.2.3.4", 5, 60).await;
        assert!(d.allowed);
    }
}
