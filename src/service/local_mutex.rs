use super::TxGuard;
use crate::core::{Result, StockId};
use crate::storage::{LockTable, StockStore};
use std::sync::Arc;

/// Serializes decrements of the same stock through a per-id mutex owned by
/// this service.
///
/// The mutex is held across the whole transaction, commit included, so the
/// next caller always reads committed data. It only coordinates callers that
/// share this service instance: a second process or a second service over
/// the same store is not excluded.
pub struct LocalMutexStockService<S: StockStore> {
    store: Arc<S>,
    locks: LockTable<StockId>,
}

impl<S: StockStore> LocalMutexStockService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: LockTable::new(),
        }
    }

    pub async fn decrease(&self, id: StockId, amount: u64) -> Result<()> {
        let _held = self.locks.acquire_unbounded(&id).await?;

        let guard = TxGuard::begin(&self.store).await?;
        let tx = guard.id();
        let result = async {
            let mut stock = self.store.fetch_by_id(tx, id).await?;
            stock.decrease(amount)?;
            self.store.persist(tx, &stock).await
        }
        .await;

        guard.finish(result).await
    }
}
