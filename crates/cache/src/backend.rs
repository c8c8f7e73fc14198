//! The `CacheBackend` trait: raw string key/value storage with TTLs.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::CacheError;

#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Reachability check for health reporting.
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short name shown in logs and health output.
    fn name(&self) -> &'static str;
}
