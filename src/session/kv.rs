// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Key-value backends for refresh sessions.
//!
//! ## Backends
//!
//! - **Redis** (`RedisBackend`): shared across instances, TTL handled by Redis
//! - **Memory** (`MemoryBackend`): single process, for tests and local runs
//!   with `SESSION_STORE=memory`
//!
//! Only the handful of commands the session store needs are exposed: string
//! values with expiry, sets, and key expiry.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Pool};
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable, timed out, or returned an error
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Redis-style expiry in whole seconds, never below one.
pub fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Set a string value with expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Reset a key's expiry. A missing key is not an error.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}

// =============================================================================
// Redis
// =============================================================================

/// Redis settings, usually built from `REDIS_*` variables.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisSettings {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool. Connections are made lazily, so this succeeds even when
    /// Redis is down.
    pub fn connect(settings: &RedisSettings, timeout: Duration) -> Result<Self, StoreError> {
        let mut config = deadpool_redis::Config::from_url(settings.url());
        if let Some(ref mut pool_config) = config.pool {
            pool_config.timeouts.wait = Some(timeout);
            pool_config.timeouts.create = Some(timeout);
            pool_config.timeouts.recycle = Some(timeout);
        }
        let pool = config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn redis_err(e: deadpool_redis::redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
            .await
            .map_err(redis_err)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key).await.map_err(redis_err)
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await.map_err(redis_err)?;
        Ok(removed > 0)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(key, member).await.map_err(redis_err)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.srem::<_, _, ()>(key, member).await.map_err(redis_err)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.smembers::<_, Vec<String>>(key).await.map_err(redis_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        conn.expire::<_, ()>(key, secs).await.map_err(redis_err)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.conn().await.map(|_| ())
    }
}

// =============================================================================
// Memory
// =============================================================================

/// Operations that can be made to fail in [`MemoryBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvOp {
    SetEx,
    Get,
    Del,
    Sadd,
    Srem,
    Smembers,
    Expire,
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process backend with Redis expiry semantics.
///
/// Expiry uses `tokio::time::Instant`, so tests can drive it with paused time.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    offline: AtomicBool,
    hanging: AtomicBool,
    failures: Mutex<Vec<(KvOp, String)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the server were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every operation block forever.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Fail `op` on keys starting with `key_prefix`.
    pub fn inject_failure(&self, op: KvOp, key_prefix: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((op, key_prefix.into()));
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time to live for `key`, `None` if missing or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|at| at - now)
    }

    /// Overwrite a key without expiry. Lets tests plant corrupt records.
    pub async fn put_raw(&self, key: &str, value: &str) {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: None,
            },
        );
    }

    async fn check(&self, op: KvOp, key: &str) -> Result<(), StoreError> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        let injected = self
            .failures
            .lock()
            .map(|f| f.iter().any(|(o, prefix)| *o == op && key.starts_with(prefix.as_str())))
            .unwrap_or(false);
        if injected {
            return Err(StoreError::Unavailable(format!("injected failure on {op:?}")));
        }
        Ok(())
    }
}

fn wrong_type() -> StoreError {
    StoreError::Unavailable("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check(KvOp::SetEx, key).await?;
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs(ttl));
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check(KvOp::Get, key).await?;
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            None => Ok(None),
            Some(Entry { value: Value::Str(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type()),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.check(KvOp::Del, key).await?;
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check(KvOp::Sadd, key).await?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            Value::Str(_) => Err(wrong_type()),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check(KvOp::Srem, key).await?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let now_empty = match entries.get_mut(key).filter(|e| e.is_live(now)) {
            None => return Ok(()),
            Some(Entry { value: Value::Set(set), .. }) => {
                set.remove(member);
                set.is_empty()
            }
            Some(_) => return Err(wrong_type()),
        };
        // Redis drops empty sets
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check(KvOp::Smembers, key).await?;
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::Set(set), .. }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check(KvOp::Expire, key).await?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key).filter(|e| e.is_live(now)) {
            entry.expires_at = Some(now + Duration::from_secs(ttl_secs(ttl)));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_secs(Duration::from_millis(1)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs(Duration::from_secs(900)), 900);
    }

    #[test]
    fn redis_url_includes_password_and_db() {
        let mut settings = RedisSettings {
            host: "cache".to_string(),
            port: 6380,
            password: None,
            db: 2,
        };
        assert_eq!(settings.url(), "redis://cache:6380/2");
        settings.password = Some("s3cret".to_string());
        assert_eq!(settings.url(), "redis://:s3cret@cache:6380/2");
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire() {
        let kv = MemoryBackend::new();
        kv.set_ex("k", "v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(kv.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_resets_set_ttl() {
        let kv = MemoryBackend::new();
        kv.sadd("s", "a").await.unwrap();
        assert_eq!(kv.ttl("s").await, None);

        kv.expire("s", Duration::from_secs(30)).await.unwrap();
        assert_eq!(kv.ttl("s").await, Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(kv.smembers("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn srem_of_last_member_drops_the_set() {
        let kv = MemoryBackend::new();
        kv.sadd("s", "a").await.unwrap();
        kv.sadd("s", "b").await.unwrap();
        kv.srem("s", "a").await.unwrap();
        assert_eq!(kv.smembers("s").await.unwrap(), vec!["b"]);

        kv.srem("s", "b").await.unwrap();
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn injected_failures_match_op_and_prefix() {
        let kv = MemoryBackend::new();
        kv.inject_failure(KvOp::Del, "refresh_token:");

        kv.set_ex("refresh_token:x", "v", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            kv.del("refresh_token:x").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(kv.del("other").await.is_ok());

        kv.clear_failures();
        assert!(kv.del("refresh_token:x").await.unwrap());
    }

    #[tokio::test]
    async fn offline_backend_rejects_everything() {
        let kv = MemoryBackend::new();
        kv.set_offline(true);
        assert!(kv.ping().await.is_err());
        assert!(kv.get("k").await.is_err());
    }

    #[tokio::test]
    async fn get_on_set_is_wrong_type() {
        let kv = MemoryBackend::new();
        kv.sadd("s", "a").await.unwrap();
        assert!(kv.get("s").await.is_err());
    }
}
