use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Read/write lock around store state that survives poisoning.
///
/// A panic while the lock is held leaves plain values behind, so the guard is
/// recovered and the event logged instead of propagating the panic to every
/// later request.
pub(crate) struct StoreLock<T> {
    inner: RwLock<T>,
    source: &'static str,
}

impl<T> StoreLock<T> {
    pub(crate) fn new(value: T, source: &'static str) -> Self {
        Self {
            inner: RwLock::new(value),
            source,
        }
    }

    pub(crate) fn read(&self, op: &'static str) -> RwLockReadGuard<'_, T> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| self.recover(poisoned, op, "rwlock.read"))
    }

    pub(crate) fn write(&self, op: &'static str) -> RwLockWriteGuard<'_, T> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| self.recover(poisoned, op, "rwlock.write"))
    }

    fn recover<G>(&self, poisoned: PoisonError<G>, op: &'static str, kind: &'static str) -> G {
        warn!(
            op,
            target_module = self.source,
            lock_kind = kind,
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.inner.write();
            panic!("poison store lock");
        }));
    }
}
