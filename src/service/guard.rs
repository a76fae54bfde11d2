use crate::core::Result;
use crate::storage::StockStore;
use crate::transaction::TransactionId;
use std::sync::Arc;
use tracing::warn;

/// One decrement transaction, from `begin` until it is finished.
///
/// [`finish`](TxGuard::finish) commits or rolls back. If the guard is dropped
/// before `finish` completes (the decrement future was cancelled), a rollback
/// is spawned on the current runtime so the row locks the transaction holds
/// are freed.
pub(crate) struct TxGuard<S: StockStore> {
    store: Arc<S>,
    tx: TransactionId,
    armed: bool,
}

impl<S: StockStore> TxGuard<S> {
    pub(crate) async fn begin(store: &Arc<S>) -> Result<Self> {
        let tx = store.begin().await?;
        Ok(Self {
            store: Arc::clone(store),
            tx,
            armed: true,
        })
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.tx
    }

    /// Commits on success, rolls back otherwise.
    ///
    /// The error that aborted the work is returned even if the rollback
    /// itself fails; the rollback failure is only logged.
    pub(crate) async fn finish(mut self, result: Result<()>) -> Result<()> {
        let tx = self.tx;
        let err = match result {
            Ok(()) => match self.store.commit(tx).await {
                Ok(()) => {
                    self.armed = false;
                    return Ok(());
                }
                Err(err) => err,
            },
            Err(err) => err,
        };

        if let Err(rollback_err) = self.store.rollback(tx).await {
            warn!(%tx, error = %rollback_err, "Rollback failed");
        }
        self.armed = false;
        Err(err)
    }
}

impl<S: StockStore> Drop for TxGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let tx = self.tx;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    if let Err(err) = store.rollback(tx).await {
                        warn!(%tx, error = %err, "Deferred rollback failed");
                    }
                });
            }
            Err(_) => warn!(%tx, "No runtime to roll back abandoned transaction"),
        }
    }
}
