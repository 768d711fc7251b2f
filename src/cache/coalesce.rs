//! Single-flight execution keyed by fingerprint.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone)]
pub enum CoalesceError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("coalesced computation aborted: {0}")]
    Aborted(String),
}

type Outcome<T, E> = Result<T, CoalesceError<E>>;

struct Group<T, E> {
    id: u64,
    outcome: Shared<BoxFuture<'static, Outcome<T, E>>>,
}

/// Collapses concurrent computations for the same key into one.
///
/// The first caller for a key becomes the leader: its computation runs on a
/// detached task, so dropping the leader's request does not cancel the work
/// other callers are waiting on. Every caller that arrives while the group is
/// open receives a clone of the same outcome, errors included. The group is
/// closed when the computation finishes.
pub struct Coalescer<T, E> {
    groups: Arc<DashMap<String, Group<T, E>>>,
    generation: Arc<AtomicU64>,
}

impl<T, E> Clone for Coalescer<T, E> {
    fn clone(&self) -> Self {
        Self {
            groups: Arc::clone(&self.groups),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<T, E> Default for Coalescer<T, E> {
    fn default() -> Self {
        Self {
            groups: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T, E> Coalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with an outstanding computation.
    pub fn in_flight(&self) -> usize {
        self.groups.len()
    }

    /// Run `compute` unless a computation for `key` is already outstanding.
    ///
    /// Returns the outcome and whether it was shared with an earlier caller.
    /// `compute` is only invoked by the leader.
    pub async fn run<F, Fut>(&self, key: &str, compute: F) -> (Outcome<T, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (outcome, shared) = match self.groups.entry(key.to_string()) {
            Entry::Occupied(group) => (group.get().outcome.clone(), true),
            Entry::Vacant(slot) => {
                let id = self.generation.fetch_add(1, Ordering::Relaxed);
                let closer = GroupCloser {
                    groups: Arc::clone(&self.groups),
                    key: key.to_string(),
                    id,
                };
                let work = compute();
                let task = tokio::spawn(async move {
                    let _closer = closer;
                    work.await
                });
                let outcome = async move {
                    match task.await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(CoalesceError::Failed(err)),
                        Err(join) => Err(CoalesceError::Aborted(join.to_string())),
                    }
                }
                .boxed()
                .shared();
                slot.insert(Group {
                    id,
                    outcome: outcome.clone(),
                });
                (outcome, false)
            }
        };

        if shared {
            metrics::counter!("feedgate_coalesced_total").increment(1);
            debug!(target = "cache::coalesce", key, "joined in-flight computation");
        }

        (outcome.await, shared)
    }
}

/// Closes a group when its computation ends, including by panic.
struct GroupCloser<T, E> {
    groups: Arc<DashMap<String, Group<T, E>>>,
    key: String,
    id: u64,
}

impl<T, E> Drop for GroupCloser<T, E> {
    fn drop(&mut self) {
        // A newer group under the same key must survive.
        self.groups.remove_if(&self.key, |_, group| group.id == self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    use tokio::task::JoinSet;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_execution() {
        let coalescer: Coalescer<u32, String> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();

        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let calls = Arc::clone(&calls);
            set.spawn(async move {
                coalescer
                    .run("/ns/route", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(42)
                    })
                    .await
            });
        }

        let mut shared = 0;
        while let Some(joined) = set.join_next().await {
            let (outcome, was_shared) = joined.unwrap();
            assert_eq!(outcome.unwrap(), 42);
            shared += usize::from(was_shared);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared, 7);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reaches_every_waiter() {
        let coalescer: Coalescer<u32, String> = Coalescer::new();
        let slow_failure = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<u32, String>("upstream down".to_string())
        };

        let (first, second) = tokio::join!(
            coalescer.run("k", slow_failure),
            coalescer.run("k", slow_failure),
        );

        for (outcome, _) in [first, second] {
            match outcome {
                Err(CoalesceError::Failed(message)) => assert_eq!(message, "upstream down"),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn completed_group_is_cleared() {
        let coalescer: Coalescer<usize, String> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let counter = Arc::clone(&calls);
            let (outcome, shared) = coalescer
                .run("k", move || async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) })
                .await;
            assert_eq!(outcome.unwrap(), expected);
            assert!(!shared);
        }
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_leader_does_not_cancel_computation() {
        let coalescer: Coalescer<(), String> = Coalescer::new();
        let finished = Arc::new(AtomicBool::new(false));

        let leader = {
            let coalescer = coalescer.clone();
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                coalescer
                    .run("k", move || async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        finished.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert_eq!(coalescer.in_flight(), 1);
        leader.abort();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_computation_is_reported_as_aborted() {
        let coalescer: Coalescer<(), String> = Coalescer::new();
        let (outcome, _) = coalescer
            .run("k", || async {
                if true {
                    panic!("handler exploded");
                }
                Ok(())
            })
            .await;

        assert!(matches!(outcome, Err(CoalesceError::Aborted(_))));
        assert_eq!(coalescer.in_flight(), 0);
    }
}
