//! `cache` crate: best-effort read cache for workflow payloads.
//!
//! [`WorkflowCache`] is the only type the rest of the system touches. It wraps
//! an optional [`CacheBackend`] (moka in-process, or redis) and never
//! reports a failure: a broken backend behaves like an empty cache.

pub mod backend;
pub mod error;
pub mod memory;
pub mod redis_backend;
pub mod workflow;

pub use backend::CacheBackend;
pub use error::CacheError;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use workflow::{CacheStatus, CacheTicket, WorkflowCache, DEFAULT_TTL};
