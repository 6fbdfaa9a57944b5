// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cache store backing sessions and the distributed lock.
//!
//! - [`RedisCache`] is shared by every service instance.
//! - [`MemoryCache`] is an in-process LRU; its locks only exclude callers in
//!   the same process, so it suits single-instance deployments and tests.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use redis::{aio::ConnectionManager, Client, Script};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// String key/value store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set `key` unconditionally, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Overwrite `key` only if it is present. Returns whether the value was written.
    async fn set_xx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Set `key` only if absent. Returns whether the value was written.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Remove `key`; removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove `key` only while it holds `expected`. Returns whether it was removed.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    fn backend(&self) -> &'static str;
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

// =============================================================================
// Redis
// =============================================================================

const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        info!("connected to redis cache");
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_xx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        // Reply is OK when written, nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let removed: i64 = Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// In-process LRU
// =============================================================================

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Keys written with `set_nx_ex` are pinned outside the LRU: a held lock is
/// never evicted by capacity pressure, only by expiry or deletion.
struct MemoryState {
    entries: LruCache<String, CacheEntry>,
    pinned: HashMap<String, CacheEntry>,
}

impl MemoryState {
    /// Live value of `key`, dropping it if expired.
    fn live_value(&mut self, key: &str) -> Option<String> {
        if let Some((live, value)) = self.pinned.get(key).map(|e| (e.is_live(), e.value.clone())) {
            if live {
                return Some(value);
            }
            self.pinned.remove(key);
            return None;
        }
        match self.entries.get(key).map(|e| (e.is_live(), e.value.clone())) {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                self.entries.pop(key);
                None
            }
            None => None,
        }
    }

    fn remove(&mut self, key: &str) {
        self.pinned.remove(key);
        self.entries.pop(key);
    }
}

pub struct MemoryCache {
    state: Mutex<MemoryState>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                pinned: HashMap::new(),
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, CacheError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".into()))?;
        Ok(f(&mut state))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.with_state(|state| state.live_value(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.with_state(|state| {
            state.pinned.remove(key);
            state.entries.put(key.to_string(), CacheEntry::new(value, ttl));
        })
    }

    async fn set_xx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.with_state(|state| {
            if state.live_value(key).is_none() {
                return false;
            }
            if state.pinned.contains_key(key) {
                state.pinned.insert(key.to_string(), CacheEntry::new(value, ttl));
            } else {
                state.entries.put(key.to_string(), CacheEntry::new(value, ttl));
            }
            true
        })
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.with_state(|state| {
            state.pinned.retain(|_, e| e.is_live());
            if state.live_value(key).is_some() {
                return false;
            }
            state.pinned.insert(key.to_string(), CacheEntry::new(value, ttl));
            true
        })
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.with_state(|state| state.remove(key))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        self.with_state(|state| {
            if state.live_value(key).as_deref() != Some(expected) {
                return false;
            }
            state.remove(key);
            true
        })
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.with_state(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryCache::new(10);
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new(10);
        cache.set_ex("k", "v", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_nx_only_writes_absent_keys() {
        let cache = MemoryCache::new(10);
        assert!(cache.set_nx_ex("lock", "a", Duration::from_secs(60)).await.unwrap());
        assert!(!cache.set_nx_ex("lock", "b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn set_nx_replaces_expired_keys() {
        let cache = MemoryCache::new(10);
        assert!(cache.set_nx_ex("lock", "a", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.set_nx_ex("lock", "b", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set_ex("a", "1", ttl).await.unwrap();
        cache.set_ex("b", "2", ttl).await.unwrap();
        cache.get("a").await.unwrap();
        cache.set_ex("c", "3", ttl).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_xx_only_overwrites_present_keys() {
        let cache = MemoryCache::new(10);
        let ttl = Duration::from_secs(60);
        assert!(!cache.set_xx_ex("k", "v", ttl).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set_ex("k", "v", ttl).await.unwrap();
        assert!(cache.set_xx_ex("k", "w", ttl).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("w"));

        cache.delete("k").await.unwrap();
        assert!(!cache.set_xx_ex("k", "x", ttl).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn held_locks_survive_capacity_pressure() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        assert!(cache.set_nx_ex("lock:bootstrap:a", "holder", ttl).await.unwrap());

        for i in 0..10 {
            cache.set_ex(&format!("session:{i}"), "s", ttl).await.unwrap();
        }

        assert_eq!(cache.get("lock:bootstrap:a").await.unwrap().as_deref(), Some("holder"));
        assert!(!cache.set_nx_ex("lock:bootstrap:a", "other", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_delete_checks_the_holder() {
        let cache = MemoryCache::new(10);
        let ttl = Duration::from_secs(60);
        cache.set_nx_ex("lock", "a", ttl).await.unwrap();

        assert!(!cache.delete_if_eq("lock", "b").await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap().as_deref(), Some("a"));
        assert!(cache.delete_if_eq("lock", "a").await.unwrap());
        assert!(!cache.delete_if_eq("lock", "a").await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap(), None);
    }
}
