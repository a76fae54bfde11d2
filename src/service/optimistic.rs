use super::TxGuard;
use crate::core::{Result, StockId};
use crate::storage::StockStore;
use std::sync::Arc;
use tracing::debug;

/// Single-attempt version-checked decrement.
///
/// No lock is taken while reading. If another transaction commits the row
/// between the read and the write, the attempt fails with
/// `ConcurrentModification` and nothing is written.
pub struct OptimisticStockService<S: StockStore> {
    store: Arc<S>,
}

impl<S: StockStore> OptimisticStockService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn decrease(&self, id: StockId, amount: u64) -> Result<()> {
        versioned_decrease(&self.store, id, amount).await
    }
}

/// Fetch with version, decrease, conditional persist, commit.
pub(crate) async fn versioned_decrease<S: StockStore>(
    store: &Arc<S>,
    id: StockId,
    amount: u64,
) -> Result<()> {
    let guard = TxGuard::begin(store).await?;
    let tx = guard.id();

    let result = async {
        let mut stock = store.fetch_with_version(tx, id).await?;
        stock.decrease(amount)?;
        store.persist(tx, &stock).await
    }
    .await;

    if let Err(err) = &result {
        debug!(%tx, stock_id = %id, kind = err.kind(), "Versioned decrease failed");
    }
    guard.finish(result).await?;
    debug!(%tx, stock_id = %id, amount, "Versioned decrease committed");
    Ok(())
}
