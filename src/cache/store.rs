//! Cache store contract shared by the in-process and Redis backends.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Absent or expired. Always recoverable.
    #[error("cache miss")]
    Miss,
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache operation `{op}` timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
    #[error("cached payload is malformed: {0}")]
    Payload(String),
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

/// Key/value store with per-entry TTL.
///
/// Payloads are opaque strings. Callers treat every error, not only
/// [`CacheError::Miss`], as "not cached".
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<String, CacheError>;

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;
}
