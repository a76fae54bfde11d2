use super::optimistic::versioned_decrease;
use crate::core::{Result, StockId};
use crate::storage::StockStore;
use std::sync::Arc;

/// The decrement performed while the caller holds the named lock for the
/// stock.
///
/// It always opens a fresh transaction, so the lock's critical section covers
/// exactly one begin..commit and never leaks into a caller's transaction. The
/// version check stays on as a second line of defence should the lock be
/// bypassed.
pub struct NamedLockStockService<S: StockStore> {
    store: Arc<S>,
}

impl<S: StockStore> NamedLockStockService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn decrease(&self, id: StockId, amount: u64) -> Result<()> {
        versioned_decrease(&self.store, id, amount).await
    }
}
