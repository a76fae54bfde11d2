// ============================================================================
// Transaction Manager
// ============================================================================

use super::{PendingWrite, Transaction, TransactionId};
use crate::core::{Result, StockError, StockId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, RwLock};

pub struct TransactionManager {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn begin(&self) -> TransactionId {
        let transaction_id = TransactionId::new();
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction_id, Transaction::new(transaction_id));
        transaction_id
    }

    pub async fn is_active(&self, txn_id: TransactionId) -> bool {
        let transactions = self.transactions.read().await;
        transactions
            .get(&txn_id)
            .is_some_and(|txn| txn.state().is_active())
    }

    pub async fn holds_row_lock(&self, txn_id: TransactionId, stock_id: StockId) -> Result<bool> {
        let transactions = self.transactions.read().await;
        let txn = transactions.get(&txn_id).ok_or_else(|| not_found(txn_id))?;
        Ok(txn.holds_row_lock(stock_id))
    }

    /// Hands a freshly acquired row lock to the transaction.
    ///
    /// If the transaction ended while the lock was being awaited the guard is
    /// dropped here, which releases the row immediately.
    pub async fn attach_row_lock(
        &self,
        txn_id: TransactionId,
        stock_id: StockId,
        guard: OwnedMutexGuard<()>,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let txn = transactions.get_mut(&txn_id).ok_or_else(|| not_found(txn_id))?;
        txn.attach_row_lock(stock_id, guard);
        Ok(())
    }

    pub async fn pending_write(
        &self,
        txn_id: TransactionId,
        stock_id: StockId,
    ) -> Result<Option<PendingWrite>> {
        let transactions = self.transactions.read().await;
        let txn = transactions.get(&txn_id).ok_or_else(|| not_found(txn_id))?;
        Ok(txn.pending_write(stock_id).copied())
    }

    pub async fn stage_write(
        &self,
        txn_id: TransactionId,
        stock_id: StockId,
        write: PendingWrite,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let txn = transactions.get_mut(&txn_id).ok_or_else(|| not_found(txn_id))?;
        txn.stage_write(stock_id, write)
    }

    /// Removes the transaction so the caller can finish committing it.
    pub async fn take(&self, txn_id: TransactionId) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        transactions.remove(&txn_id).ok_or_else(|| not_found(txn_id))
    }

    /// Aborts the transaction. Unknown or already finished transactions are
    /// ignored so that rollback can always be called on an error path.
    pub async fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;

        if let Some(mut transaction) = transactions.remove(&txn_id) {
            transaction.rollback()?;
        }
        Ok(())
    }

    pub async fn active_count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

fn not_found(txn_id: TransactionId) -> StockError {
    StockError::InvalidOperation(format!("Transaction {} not found or already finished", txn_id))
}
