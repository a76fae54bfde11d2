use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A table of async mutexes keyed by `K`.
///
/// Each key maps to one FIFO mutex. Guards are owned, so they can be stored in
/// a transaction or a named-lock slot and released simply by dropping them.
/// A slot nobody holds or waits on can be dropped with
/// [`remove_idle`](LockTable::remove_idle).
pub struct LockTable<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for LockTable<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LockTable<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> crate::core::Result<Arc<AsyncMutex<()>>> {
        let mut locks = self.locks.lock()?;
        Ok(locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// Waits up to `wait` for the lock on `key`.
    ///
    /// Returns `Ok(None)` when the wait elapsed. A zero wait still succeeds
    /// on an uncontended lock.
    pub async fn acquire(
        &self,
        key: &K,
        wait: Duration,
    ) -> crate::core::Result<Option<OwnedMutexGuard<()>>> {
        let slot = self.slot(key)?;
        if let Ok(guard) = slot.clone().try_lock_owned() {
            return Ok(Some(guard));
        }
        match tokio::time::timeout(wait, slot.lock_owned()).await {
            Ok(guard) => Ok(Some(guard)),
            Err(_) => Ok(None),
        }
    }

    /// Waits for the lock on `key` with no deadline.
    pub async fn acquire_unbounded(&self, key: &K) -> crate::core::Result<OwnedMutexGuard<()>> {
        let slot = self.slot(key)?;
        Ok(slot.lock_owned().await)
    }

    /// Drops the slot for `key` if no guard or waiter references it.
    ///
    /// Guards and waiters each keep a clone of the slot's `Arc`, and clones are
    /// only handed out under the table lock, so a count of one means the slot
    /// is unreachable from outside the table.
    pub fn remove_idle(&self, key: &K) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    /// `true` while some guard for `key` is alive.
    pub fn is_locked(&self, key: &K) -> bool {
        let Ok(locks) = self.locks.lock() else {
            return false;
        };
        locks
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }
}
