//! Cache configuration.
//!
//! Resolved from the `cache` section of the settings; selects the backend and
//! sizes the in-process store and the background writer.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_ROUTE_EXPIRE_SECONDS: u64 = 300;
const DEFAULT_MEMORY_MAX_ENTRIES: usize = 256;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 2000;
const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 1024;

/// Which backend stores rendered feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKind {
    Memory,
    Redis { url: String },
    /// No store; concurrent identical requests are still coalesced.
    None,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub kind: CacheKind,
    /// TTL for stored feeds, also advertised as `Cache-Control: max-age`.
    pub route_expire_seconds: u64,
    pub memory_max_entries: usize,
    pub sweep_interval_seconds: u64,
    /// Upper bound for a single store round trip.
    pub operation_timeout_ms: u64,
    pub write_queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Memory,
            route_expire_seconds: DEFAULT_ROUTE_EXPIRE_SECONDS,
            memory_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            kind: settings.kind.clone(),
            route_expire_seconds: settings.route_expire_seconds,
            memory_max_entries: settings.memory_max_entries,
            sweep_interval_seconds: settings.sweep_interval_seconds,
            operation_timeout_ms: settings.operation_timeout_ms,
            write_queue_capacity: settings.write_queue_capacity,
        }
    }
}

impl CacheConfig {
    pub fn route_expire(&self) -> Duration {
        Duration::from_secs(self.route_expire_seconds)
    }

    /// Sweep interval, clamped to at least one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms.max(1))
    }

    /// Returns the memory store capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the writer queue capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn write_queue_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.write_queue_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
