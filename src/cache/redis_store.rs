//! Redis-backed cache store shared between instances.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::RedisResult;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::store::{CacheError, CacheStore};

const TTL_KEY_PREFIX: &str = "feedgate:cache-ttl:";

/// Stores payloads without expiry and tracks freshness on a companion key.
///
/// The companion key carries the real TTL. A payload whose companion key is
/// gone is a miss even if the payload itself is still present; Redis reclaims
/// such keys under its own eviction policy. A hit re-arms the companion key
/// with the remaining TTL it had at read time.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    timeout: Duration,
    url: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect and verify the server answers `PING` within `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|err| CacheError::Backend(err.to_string()))?;
        let connection = match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => return Err(CacheError::Backend(err.to_string())),
            Err(_) => {
                return Err(CacheError::Timeout {
                    op: "connect",
                    timeout,
                });
            }
        };

        let store = Self {
            connection,
            timeout,
            url: url.to_string(),
        };

        let mut connection = store.connection.clone();
        let pong: String = store
            .timed("ping", redis::cmd("PING").query_async::<_, String>(&mut connection))
            .await?;
        info!(target = "cache::redis", reply = %pong, "connected to redis");

        Ok(store)
    }

    fn ttl_key(key: &str) -> String {
        format!("{TTL_KEY_PREFIX}{key}")
    }

    async fn timed<T, F>(&self, op: &'static str, request: F) -> Result<T, CacheError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(CacheError::Backend(format!("{op}: {err}"))),
            Err(_) => Err(CacheError::Timeout {
                op,
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<String, CacheError> {
        let ttl_key = Self::ttl_key(key);
        let mut connection = self.connection.clone();

        // -2 when the key is missing, -1 when it has no expiry.
        let remaining_ms: i64 = self
            .timed(
                "pttl",
                redis::cmd("PTTL")
                    .arg(&ttl_key)
                    .query_async::<_, i64>(&mut connection),
            )
            .await?;
        if remaining_ms <= 0 {
            return Err(CacheError::Miss);
        }

        let _: i64 = self
            .timed(
                "pexpire",
                redis::cmd("PEXPIRE")
                    .arg(&ttl_key)
                    .arg(remaining_ms)
                    .query_async::<_, i64>(&mut connection),
            )
            .await?;

        let payload: Option<String> = self
            .timed(
                "get",
                redis::cmd("GET")
                    .arg(key)
                    .query_async::<_, Option<String>>(&mut connection),
            )
            .await?;

        payload.ok_or_else(|| {
            debug!(target = "cache::redis", key, "tracking key outlived payload");
            CacheError::Miss
        })
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut connection = self.connection.clone();

        let _: () = self
            .timed(
                "set",
                redis::cmd("SET")
                    .arg(key)
                    .arg(payload)
                    .query_async::<_, ()>(&mut connection),
            )
            .await?;

        let _: () = self
            .timed(
                "set_ttl",
                redis::cmd("SET")
                    .arg(Self::ttl_key(key))
                    .arg("1")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async::<_, ()>(&mut connection),
            )
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        self.timed(
            "delete",
            redis::pipe()
                .cmd("DEL")
                .arg(key)
                .ignore()
                .cmd("DEL")
                .arg(Self::ttl_key(key))
                .ignore()
                .query_async::<_, ()>(&mut connection),
        )
        .await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_key_is_namespaced() {
        assert_eq!(
            RedisStore::ttl_key("feedgate:cache:abc"),
            "feedgate:cache-ttl:feedgate:cache:abc"
        );
    }

    #[tokio::test]
    async fn invalid_url_is_a_backend_error() {
        let err = RedisStore::connect("not a url", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Backend(_)));
    }
}
