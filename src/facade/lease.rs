use crate::core::Result;
use crate::storage::{NamedLockLease, StockStore};
use std::sync::Arc;
use tracing::warn;

/// Owns a named-lock lease until it is released.
///
/// [`release`](LeaseGuard::release) is the normal path. If the guard is
/// dropped while still holding the lease (the owning future was cancelled),
/// the release is spawned on the current runtime instead.
pub(crate) struct LeaseGuard<S: StockStore> {
    store: Arc<S>,
    lease: Option<NamedLockLease>,
}

impl<S: StockStore> LeaseGuard<S> {
    pub(crate) fn new(store: Arc<S>, lease: NamedLockLease) -> Self {
        Self {
            store,
            lease: Some(lease),
        }
    }

    /// Releases the lease. Later calls are no-ops.
    pub(crate) async fn release(&mut self) -> Result<()> {
        match self.lease.take() {
            Some(lease) => self.store.release_named_lock(lease).await,
            None => Ok(()),
        }
    }
}

impl<S: StockStore> Drop for LeaseGuard<S> {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    let key = lease.key().to_string();
                    if let Err(err) = store.release_named_lock(lease).await {
                        warn!(key = %key, error = %err, "Deferred named lock release failed");
                    }
                });
            }
            Err(_) => warn!(
                key = lease.key(),
                "No runtime to release named lock on drop"
            ),
        }
    }
}
