//! Response cache for rendered feeds.
//!
//! - **Stores**: an in-process bounded store or a shared Redis store, behind
//!   [`CacheStore`]. Either may be switched off with `cache.kind = "none"`.
//! - **Coalescing**: concurrent requests for the same [`Fingerprint`] share one
//!   handler run, whether or not a store is configured.
//! - **Writes**: stored through [`CacheWriter`] off the request path.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! kind = "memory"            # memory | redis | none
//! route_expire_seconds = 300
//! memory_max_entries = 256
//! # redis_url = "redis://127.0.0.1:6379/0"
//! ```

mod coalesce;
mod config;
mod keys;
mod lock;
mod memory;
mod middleware;
mod redis_store;
mod store;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

pub use coalesce::{CoalesceError, Coalescer};
pub use config::{CacheConfig, CacheKind};
pub use keys::{Fingerprint, KEY_PREFIX};
pub use memory::MemoryStore;
pub use middleware::{CacheableResponse, CapturedResponse, response_cache_layer};
pub use redis_store::RedisStore;
pub use store::{CacheError, CacheStore};
pub use writer::CacheWriter;

/// Shared state for the cache stage.
#[derive(Clone)]
pub struct CacheState {
    pub store: Option<Arc<dyn CacheStore>>,
    pub writer: Option<CacheWriter>,
    pub coalescer: Coalescer<CapturedResponse, String>,
    pub ttl: Duration,
}

impl CacheState {
    /// Open the configured backend and start its background tasks.
    ///
    /// A Redis backend that cannot be reached at startup is an error; once
    /// running, backend failures only ever count as misses.
    pub async fn from_config(
        config: &CacheConfig,
    ) -> Result<(Self, Vec<JoinHandle<()>>), CacheError> {
        let mut tasks = Vec::new();

        let store: Option<Arc<dyn CacheStore>> = match &config.kind {
            CacheKind::Memory => {
                let memory = Arc::new(MemoryStore::new(config.memory_max_entries_non_zero()));
                tasks.push(memory.spawn_sweeper(config.sweep_interval()));
                Some(memory)
            }
            CacheKind::Redis { url } => {
                let redis = RedisStore::connect(url, config.operation_timeout()).await?;
                Some(Arc::new(redis))
            }
            CacheKind::None => None,
        };

        info!(
            target = "cache",
            backend = store.as_ref().map_or("none", |store| store.backend()),
            ttl_seconds = config.route_expire_seconds,
            "response cache ready"
        );

        let (state, writer_task) = Self::with_store(store, config);
        tasks.extend(writer_task);
        Ok((state, tasks))
    }

    /// Build around an existing store. The writer task is returned when a
    /// store is present.
    pub fn with_store(
        store: Option<Arc<dyn CacheStore>>,
        config: &CacheConfig,
    ) -> (Self, Option<JoinHandle<()>>) {
        let (writer, task) = match &store {
            Some(store) => {
                let (writer, task) =
                    CacheWriter::spawn(Arc::clone(store), config.write_queue_capacity_non_zero());
                (Some(writer), Some(task))
            }
            None => (None, None),
        };

        let state = Self {
            store,
            writer,
            coalescer: Coalescer::new(),
            ttl: config.route_expire(),
        };
        (state, task)
    }

    /// Coalescing only; nothing is stored.
    pub fn disabled(ttl: Duration) -> Self {
        Self {
            store: None,
            writer: None,
            coalescer: Coalescer::new(),
            ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_config_starts_sweeper_and_writer() {
        let config = CacheConfig::default();
        let (state, tasks) = CacheState::from_config(&config).await.unwrap();

        assert_eq!(state.store.as_ref().map(|store| store.backend()), Some("memory"));
        assert!(state.writer.is_some());
        assert_eq!(state.ttl, Duration::from_secs(300));
        assert_eq!(tasks.len(), 2);

        for task in tasks {
            task.abort();
        }
    }

    #[tokio::test]
    async fn none_config_only_coalesces() {
        let config = CacheConfig {
            kind: CacheKind::None,
            ..CacheConfig::default()
        };
        let (state, tasks) = CacheState::from_config(&config).await.unwrap();

        assert!(state.store.is_none());
        assert!(state.writer.is_none());
        assert!(tasks.is_empty());
    }
}
