//! Cache backend errors. These stay inside the crate's public surface only
//! so backends can be tested; [`WorkflowCache`](crate::WorkflowCache)
//! swallows them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
