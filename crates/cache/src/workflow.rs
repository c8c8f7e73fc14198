//! Owner-scoped workflow read cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::CacheBackend;

/// Default lifetime of a cached workflow.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

const KEY_PREFIX: &str = "workflow:";

/// Health of the cache as reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    NotConfigured,
    Connected,
    Disconnected,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    owner_id: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    owner_id: String,
    payload: T,
}

/// Invalidation count observed before a store read; see [`WorkflowCache::ticket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket(u64);

/// Read-through cache for workflow payloads keyed by workflow id.
///
/// Entries remember the owner they were stored for; a hit belonging to a
/// different owner is a miss. Backend failures are logged and otherwise
/// ignored. Built without a backend it is the disabled sentinel: every
/// lookup misses and every write is a no-op.
#[derive(Debug, Clone)]
pub struct WorkflowCache {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
    /// Bumped by every invalidation in this process.
    epoch: Arc<AtomicU64>,
}

impl WorkflowCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend: Some(backend), ttl, epoch: Arc::new(AtomicU64::new(0)) }
    }

    pub fn disabled() -> Self {
        Self { backend: None, ttl: DEFAULT_TTL, epoch: Arc::new(AtomicU64::new(0)) }
    }

    /// Take before reading the store on a miss, then hand to [`Self::set_fresh`].
    pub fn ticket(&self) -> CacheTicket {
        CacheTicket(self.epoch.load(Ordering::SeqCst))
    }

    fn key(workflow_id: Uuid) -> String {
        format!("{KEY_PREFIX}{workflow_id}")
    }

    /// Cached payload for `workflow_id`, if present and stored for `owner_id`.
    pub async fn get<T: DeserializeOwned>(&self, workflow_id: Uuid, owner_id: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;

        let raw = match backend.get(&Self::key(workflow_id)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(%workflow_id, error = %e, "workflow cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) if envelope.owner_id == owner_id => {
                debug!(%workflow_id, "workflow cache hit");
                Some(envelope.payload)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(%workflow_id, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store `payload` for `owner_id` with the configured TTL.
    pub async fn set<T: Serialize>(&self, workflow_id: Uuid, owner_id: &str, payload: &T) {
        self.set_with_ttl(workflow_id, owner_id, payload, self.ttl).await;
    }

    /// Like [`Self::set`], but drops the entry again if any invalidation
    /// ran after `ticket` was taken, so a read that raced a mutation is
    /// never served for the rest of the TTL.
    pub async fn set_fresh<T: Serialize>(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        payload: &T,
        ticket: CacheTicket,
    ) {
        if self.ticket() != ticket {
            debug!(%workflow_id, "workflow changed during read; not caching");
            return;
        }
        self.set(workflow_id, owner_id, payload).await;
        if self.ticket() != ticket {
            debug!(%workflow_id, "workflow changed during cache write; dropping entry");
            self.invalidate(workflow_id).await;
        }
    }

    pub async fn set_with_ttl<T: Serialize>(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        payload: &T,
        ttl: Duration,
    ) {
        let Some(backend) = &self.backend else {
            return;
        };

        let raw = match serde_json::to_string(&EnvelopeRef { owner_id, payload }) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%workflow_id, error = %e, "workflow cache payload not serialisable");
                return;
            }
        };

        if let Err(e) = backend.set(&Self::key(workflow_id), raw, ttl).await {
            warn!(%workflow_id, error = %e, "workflow cache write failed");
        }
    }

    /// Drop the cached payload; called after every workflow, step or edge mutation.
    pub async fn invalidate(&self, workflow_id: Uuid) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.delete(&Self::key(workflow_id)).await {
            warn!(%workflow_id, error = %e, "workflow cache invalidation failed");
        }
    }

    pub async fn status(&self) -> CacheStatus {
        match &self.backend {
            None => CacheStatus::NotConfigured,
            Some(backend) => match backend.ping().await {
                Ok(()) => CacheStatus::Connected,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "cache health check failed");
                    CacheStatus::Disconnected
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheError, MemoryBackend};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn cache() -> WorkflowCache {
        WorkflowCache::new(
            Arc::new(MemoryBackend::new(100, Duration::from_secs(60))),
            Duration::from_secs(30),
        )
    }

    #[derive(Debug)]
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(serde_json::from_str::<Value>("not json").unwrap_err().into())
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(serde_json::from_str::<Value>("not json").unwrap_err().into())
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(serde_json::from_str::<Value>("not json").unwrap_err().into())
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(serde_json::from_str::<Value>("not json").unwrap_err().into())
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn hit_for_the_same_owner_only() {
        let cache = cache();
        let id = Uuid::new_v4();
        cache.set(id, "alice", &json!({ "name": "wf" })).await;

        let hit: Option<Value> = cache.get(id, "alice").await;
        assert_eq!(hit, Some(json!({ "name": "wf" })));

        let other: Option<Value> = cache.get(id, "bob").await;
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let cache = cache();
        let id = Uuid::new_v4();
        cache.set(id, "alice", &json!(1)).await;
        cache.invalidate(id).await;

        let hit: Option<Value> = cache.get(id, "alice").await;
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn read_overtaken_by_invalidation_is_not_cached() {
        let cache = cache();
        let id = Uuid::new_v4();

        let ticket = cache.ticket();
        cache.invalidate(id).await;
        cache.set_fresh(id, "alice", &json!({ "name": "stale" }), ticket).await;

        let hit: Option<Value> = cache.get(id, "alice").await;
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn undisturbed_read_is_cached() {
        let cache = cache();
        let id = Uuid::new_v4();

        let ticket = cache.ticket();
        cache.set_fresh(id, "alice", &json!({ "name": "wf" }), ticket).await;

        let hit: Option<Value> = cache.get(id, "alice").await;
        assert_eq!(hit, Some(json!({ "name": "wf" })));
    }

    #[tokio::test]
    async fn clones_share_invalidations() {
        let cache = cache();
        let other = cache.clone();
        let id = Uuid::new_v4();

        let ticket = cache.ticket();
        other.invalidate(id).await;
        cache.set_fresh(id, "alice", &json!(1), ticket).await;

        let hit: Option<Value> = cache.get(id, "alice").await;
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = WorkflowCache::disabled();
        let id = Uuid::new_v4();
        cache.set(id, "alice", &json!(1)).await;

        let hit: Option<Value> = cache.get(id, "alice").await;
        assert_eq!(hit, None);
        assert_eq!(cache.status().await, CacheStatus::NotConfigured);
    }

    #[tokio::test]
    async fn backend_failures_are_swallowed() {
        let cache = WorkflowCache::new(Arc::new(BrokenBackend), DEFAULT_TTL);
        let id = Uuid::new_v4();
        cache.set(id, "alice", &json!(1)).await;
        cache.invalidate(id).await;

        let hit: Option<Value> = cache.get(id, "alice").await;
        assert_eq!(hit, None);
        assert_eq!(cache.status().await, CacheStatus::Disconnected);
    }
}
