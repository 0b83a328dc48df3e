// src/services/cache.rs
//! Session and OAuth-state cache
//!
//! Backed by Redis when reachable. When the connection cannot be
//! established at startup the service degrades to an in-process TTL map so
//! the API stays usable; sessions still have their database copy, only the
//! fast path is lost. Tests run against the in-memory backend.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// TTL for pending OAuth state values, in seconds
pub const OAUTH_STATE_TTL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl From<CacheError> for crate::common::ApiError {
    fn from(e: CacheError) -> Self {
        tracing::error!(error = %e, "Cache operation failed");
        crate::common::ApiError::ServiceUnavailable("cache operation failed".to_string())
    }
}

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<RwLock<HashMap<String, MemoryEntry>>>),
}

#[derive(Clone)]
pub struct CacheService {
    backend: Backend,
}

impl CacheService {
    /// Connect to Redis, falling back to the in-memory backend on failure
    pub async fn connect(url: &str) -> Self {
        match Self::try_redis(url).await {
            Ok(cache) => {
                info!("Connected to Redis");
                cache
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to Redis, using in-memory cache");
                Self::in_memory()
            }
        }
    }

    async fn try_redis(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            backend: Backend::Redis(manager),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(RwLock::new(HashMap::new()))),
        }
    }

    /// Set a key with a TTL in seconds
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
                Ok(())
            }
            Backend::Memory(map) => {
                let mut map = map.write().await;
                map.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: value.to_string(),
                        expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
                    },
                );
                Ok(())
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let value: Option<String> = conn.get(key).await?;
                Ok(value)
            }
            Backend::Memory(map) => {
                let mut map = map.write().await;
                match map.get(key) {
                    Some(entry) if entry.expired() => {
                        map.remove(key);
                        Ok(None)
                    }
                    Some(entry) => Ok(Some(entry.value.clone())),
                    None => Ok(None),
                }
            }
        }
    }

    /// Get and delete a key in one step. Concurrent callers cannot both
    /// observe the value, which is what makes one-time tokens one-time.
    pub async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let value: Option<String> = conn.get_del(key).await?;
                Ok(value)
            }
            Backend::Memory(map) => {
                let mut map = map.write().await;
                match map.remove(key) {
                    Some(entry) if entry.expired() => Ok(None),
                    Some(entry) => Ok(Some(entry.value)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Delete a key, returning whether it existed
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let removed: i64 = conn.del(key).await?;
                Ok(removed > 0)
            }
            Backend::Memory(map) => {
                let mut map = map.write().await;
                Ok(map.remove(key).is_some())
            }
        }
    }

    /// Increment a counter, starting a TTL window on first increment.
    /// Used by the rate limiter for fixed-window counting.
    pub async fn incr(&self, key: &str, window_secs: u64) -> Result<i64, CacheError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let count: i64 = conn.incr(key, 1).await?;
                if count == 1 {
                    conn.expire::<_, ()>(key, window_secs as i64).await?;
                }
                Ok(count)
            }
            Backend::Memory(map) => {
                let mut map = map.write().await;
                match map.get_mut(key) {
                    Some(entry) if !entry.expired() => {
                        let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                        entry.value = count.to_string();
                        Ok(count)
                    }
                    _ => {
                        map.insert(
                            key.to_string(),
                            MemoryEntry {
                                value: "1".to_string(),
                                expires_at: Some(
                                    Instant::now() + Duration::from_secs(window_secs),
                                ),
                            },
                        );
                        Ok(1)
                    }
                }
            }
        }
    }
}
