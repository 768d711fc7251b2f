//! Best-effort background cache writes.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::warn;

use super::store::CacheStore;

struct WriteJob {
    key: String,
    payload: String,
    ttl: Duration,
}

/// Hands rendered feeds to a single background worker that stores them.
///
/// `submit` never waits. A full queue drops the write and a failed write is
/// only logged, so nothing here can change a response.
#[derive(Clone)]
pub struct CacheWriter {
    sender: mpsc::Sender<WriteJob>,
}

impl CacheWriter {
    pub fn spawn(store: Arc<dyn CacheStore>, capacity: NonZeroUsize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<WriteJob>(capacity.get());

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Err(err) = store.set(&job.key, job.payload, job.ttl).await {
                    metrics::counter!("feedgate_cache_write_failed_total").increment(1);
                    warn!(
                        target = "cache::writer",
                        backend = store.backend(),
                        key = %job.key,
                        error = %err,
                        "cache write failed"
                    );
                }
            }
        });

        (Self { sender }, worker)
    }

    /// Queue a write. Returns whether it was accepted.
    pub fn submit(&self, key: impl Into<String>, payload: String, ttl: Duration) -> bool {
        let job = WriteJob {
            key: key.into(),
            payload,
            ttl,
        };

        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                metrics::counter!("feedgate_cache_write_dropped_total").increment(1);
                warn!(
                    target = "cache::writer",
                    key = %job.key,
                    reason = "queue_full",
                    "cache write dropped"
                );
                false
            }
            Err(TrySendError::Closed(job)) => {
                metrics::counter!("feedgate_cache_write_dropped_total").increment(1);
                warn!(
                    target = "cache::writer",
                    key = %job.key,
                    reason = "worker_stopped",
                    "cache write dropped"
                );
                false
            }
        }
    }
}
