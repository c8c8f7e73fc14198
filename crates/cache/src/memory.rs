//! In-process backend built on moka.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use crate::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    data: String,
    expires_at: Instant,
}

/// Bounded in-memory cache with a per-entry TTL.
///
/// moka only supports a cache-wide TTL, so each entry also carries its own
/// deadline and is dropped on read once past it.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    cache: MokaCache<String, Entry>,
}

impl MemoryBackend {
    /// `max_ttl` caps every entry regardless of the TTL it was stored with.
    pub fn new(max_capacity: u64, max_ttl: Duration) -> Self {
        Self {
            cache: MokaCache::builder()
                .max_capacity(max_capacity)
                .time_to_live(max_ttl)
                .build(),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.cache.get(key).await {
            Some(entry) if Instant::now() < entry.expires_at => Ok(Some(entry.data)),
            Some(_) => {
                self.cache.invalidate(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry { data: value, expires_at: Instant::now() + ttl };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
