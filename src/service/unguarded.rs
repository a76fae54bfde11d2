use super::TxGuard;
use crate::core::{Result, StockId};
use crate::storage::StockStore;
use std::sync::Arc;

/// Plain read-modify-write with no lock and no version check.
///
/// Correct for a single caller. Under contention two callers can read the
/// same quantity and both write `quantity - amount`, losing one decrement.
pub struct UnguardedStockService<S: StockStore> {
    store: Arc<S>,
}

impl<S: StockStore> UnguardedStockService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn decrease(&self, id: StockId, amount: u64) -> Result<()> {
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
