//! Upload rate limiting over fixed calendar windows.
//!
//! Counters live in a counter store keyed
//! `upload_limit:{user}:{window}:{bucket}` with a TTL of one window
//! length. Checks run hour, then day, then month, stopping at the first
//! denied window. The increment-then-decrement shape keeps the counter
//! accurate without a transaction: an over-limit attempt gives its slot
//! back before being denied.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepsake_core::constants::ADMIN_USER_ID;
use keepsake_core::AppError;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment and return the new count. Missing keys start at zero.
    async fn incr(&self, key: &str) -> Result<i64, AppError>;

    async fn decr(&self, key: &str) -> Result<i64, AppError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), AppError>;
}

/// Redis-backed counter store. `ConnectionManager` reconnects on its own,
/// so a clone per operation is all the handling a command needs.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Internal(format!("Invalid redis URL: {}", e)))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection failed: {}", e)))?;
        tracing::info!("Connected to redis counter store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1i64)
            .await
            .map_err(|e| AppError::Internal(format!("Redis INCR failed: {}", e)))
    }

    async fn decr(&self, key: &str) -> Result<i64, AppError> {
        let mut conn = self.conn.clone();
        conn.decr(key, 1i64)
            .await
            .map_err(|e| AppError::Internal(format!("Redis DECR failed: {}", e)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| AppError::Internal(format!("Redis EXPIRE failed: {}", e)))
    }
}

/// In-process counter store for single-node deployments and tests.
/// Expiry is deadline-based and evaluated lazily on access.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<HashMap<String, (i64, Option<Instant>)>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entry<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut (i64, Option<Instant>)) -> R,
    ) -> R {
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(key.to_string()).or_insert((0, None));
        if let Some(deadline) = entry.1 {
            if Instant::now() >= deadline {
                *entry = (0, None);
            }
        }
        f(entry)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        Ok(self.with_live_entry(key, |entry| {
            entry.0 += 1;
            entry.0
        }))
    }

    async fn decr(&self, key: &str) -> Result<i64, AppError> {
        Ok(self.with_live_entry(key, |entry| {
            entry.0 -= 1;
            entry.0
        }))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), AppError> {
        self.with_live_entry(key, |entry| {
            entry.1 = Some(Instant::now() + ttl);
        });
        Ok(())
    }
}

/// Per-window upload ceilings.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub hourly: i64,
    pub daily: i64,
    pub monthly: i64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            hourly: 50,
            daily: 200,
            monthly: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Window {
    Hour,
    Day,
    Month,
}

impl Window {
    fn label(self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
            Window::Month => "month",
        }
    }

    fn bucket(self, now: DateTime<Utc>) -> String {
        match self {
            Window::Hour => now.format("%Y%m%d%H").to_string(),
            Window::Day => now.format("%Y-%m-%d").to_string(),
            Window::Month => now.format("%Y%m").to_string(),
        }
    }

    fn ttl(self) -> Duration {
        match self {
            Window::Hour => Duration::from_secs(3600),
            Window::Day => Duration::from_secs(24 * 3600),
            Window::Month => Duration::from_secs(31 * 24 * 3600),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limits: UploadLimits,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, limits: UploadLimits) -> Self {
        Self { store, limits }
    }

    /// Admit one upload attempt for `user_id`, or deny with the first
    /// exhausted window. The admin account is never limited.
    pub async fn check(&self, user_id: i64) -> Result<(), AppError> {
        if user_id == ADMIN_USER_ID {
            return Ok(());
        }

        let now = Utc::now();
        let windows = [
            (Window::Hour, self.limits.hourly),
            (Window::Day, self.limits.daily),
            (Window::Month, self.limits.monthly),
        ];

        for (window, limit) in windows {
            self.check_window(user_id, window, limit, now).await?;
        }
        Ok(())
    }

    async fn check_window(
        &self,
        user_id: i64,
        window: Window,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let key = format!(
            "upload_limit:{}:{}:{}",
            user_id,
            window.label(),
            window.bucket(now)
        );

        let count = self.store.incr(&key).await?;
        if count == 1 {
            self.store.expire(&key, window.ttl()).await?;
        }

        if count > limit {
            self.store.decr(&key).await?;
            tracing::warn!(
                user_id = user_id,
                window = window.label(),
                limit = limit,
                "Upload rate limit reached"
            );
            return Err(AppError::RateLimited {
                window: window.label().to_string(),
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limits: UploadLimits) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()), limits)
    }

    #[tokio::test]
    async fn allows_exactly_the_limit_then_denies() {
        let limiter = limiter(UploadLimits {
            hourly: 3,
            daily: 100,
            monthly: 100,
        });

        for _ in 0..3 {
            limiter.check(42).await.unwrap();
        }

        match limiter.check(42).await {
            Err(AppError::RateLimited { window, limit }) => {
                assert_eq!(window, "hour");
                assert_eq!(limit, 3);
            }
            other => panic!("expected rate limit denial, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn denied_attempts_do_not_consume_budget() {
        let limiter = limiter(UploadLimits {
            hourly: 2,
            daily: 100,
            monthly: 100,
        });

        limiter.check(9).await.unwrap();
        limiter.check(9).await.unwrap();
        // Repeated denials must keep being denials, not drift the counter
        // past the ceiling.
        for _ in 0..5 {
            assert!(limiter.check(9).await.is_err());
        }
    }

    #[tokio::test]
    async fn day_window_denies_after_hourly_passes() {
        let limiter = limiter(UploadLimits {
            hourly: 100,
            daily: 1,
            monthly: 100,
        });

        limiter.check(5).await.unwrap();
        match limiter.check(5).await {
            Err(AppError::RateLimited { window, .. }) => assert_eq!(window, "day"),
            other => panic!("expected day-window denial, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn admin_is_never_limited() {
        let limiter = limiter(UploadLimits {
            hourly: 1,
            daily: 1,
            monthly: 1,
        });

        for _ in 0..10 {
            limiter.check(ADMIN_USER_ID).await.unwrap();
        }
    }

    #[tokio::test]
    async fn users_have_independent_budgets() {
        let limiter = limiter(UploadLimits {
            hourly: 1,
            daily: 100,
            monthly: 100,
        });

        limiter.check(2).await.unwrap();
        assert!(limiter.check(2).await.is_err());
        limiter.check(3).await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_counts_expire() {
        let store = MemoryCounterStore::new();
        store.incr("k").await.unwrap();
        store.incr("k").await.unwrap();
        store.expire("k", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.incr("k").await.unwrap(), 1);
    }
}
