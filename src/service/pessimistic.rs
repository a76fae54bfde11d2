use super::TxGuard;
use crate::core::{Result, StockId};
use crate::storage::StockStore;
use std::sync::Arc;
use tracing::debug;

/// Decrements under an exclusive row lock.
///
/// Concurrent callers on the same row queue on the lock and each sees the
/// quantity committed by the previous holder, so no decrement is lost.
pub struct PessimisticStockService<S: StockStore> {
    store: Arc<S>,
}

impl<S: StockStore> PessimisticStockService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn decrease(&self, id: StockId, amount: u64) -> Result<()> {
        let guard = TxGuard::begin(&self.store).await?;
        let tx = guard.id();

        let result = async {
            let mut stock = self.store.fetch_with_pessimistic_lock(tx, id).await?;
            stock.decrease(amount)?;
            // explicit even though the lock already protects the row
            self.store.persist(tx, &stock).await
        }
        .await;

        guard.finish(result).await?;
        debug!(%tx, stock_id = %id, amount, "Pessimistic decrease committed");
        Ok(())
    }
}
