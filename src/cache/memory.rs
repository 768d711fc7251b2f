//! Bounded in-process cache store.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::lock::StoreLock;
use super::store::{CacheError, CacheStore};

const SOURCE: &str = "cache::memory";

struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process store capped at a fixed number of entries.
///
/// When a new key arrives at capacity the entry with the earliest expiry is
/// evicted, not the least recently used one. Expired entries are invisible to
/// `get` right away and removed by [`MemoryStore::spawn_sweeper`] or by
/// eviction.
pub struct MemoryStore {
    entries: StoreLock<HashMap<String, CacheEntry>>,
    max_entries: NonZeroUsize,
}

impl MemoryStore {
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self {
            entries: StoreLock::new(HashMap::new(), SOURCE),
            max_entries,
        }
    }

    /// Number of resident entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.read("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write("purge_expired");
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Periodically purge expired entries until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(target = "cache::memory", removed, "swept expired entries");
                }
            }
        })
    }

    fn evict_earliest_expiry(entries: &mut HashMap<String, CacheEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            entries.remove(&key);
            metrics::counter!("feedgate_cache_evict_total").increment(1);
            debug!(target = "cache::memory", key = %key, "evicted entry");
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<String, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read("get");
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(entry.payload.clone()),
            _ => Err(CacheError::Miss),
        }
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries.write("set");

        if !entries.contains_key(key) && entries.len() >= self.max_entries.get() {
            Self::evict_earliest_expiry(&mut entries);
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write("delete").remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
